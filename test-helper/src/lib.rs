use std::net::{SocketAddr, TcpListener};

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

/// Gets a new socket address allocated by the OS.
///
/// Nothing is listening on the address once this returns, so connecting to it
/// is refused.
pub fn get_unused_addr() -> SocketAddr {
    let socket = TcpListener::bind("127.0.0.1:0").unwrap();
    socket.local_addr().unwrap()
}

/// Produces `n` random keys of `len` bytes each.
///
/// The generator is seeded so a failing distribution test can be replayed.
pub fn random_keys(n: usize, len: usize, seed: u64) -> Vec<Vec<u8>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let mut key = vec![0; len];
            rng.fill_bytes(&mut key);
            key
        })
        .collect()
}
