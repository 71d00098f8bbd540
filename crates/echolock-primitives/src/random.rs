//! CSPRNG access. The only place in the workspace allowed to pull bytes
//! directly from the OS random source.

use rand::RngCore;

/// Fill and return `n` bytes from the OS CSPRNG.
pub fn secure_random(n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    buf
}
