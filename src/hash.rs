use std::hash::Hasher as StdHasher;
use twox_hash::XxHash32;

// Make the checksum api be similiar to blake3's
pub struct Checksum(XxHash32);

impl Checksum {
    pub fn new() -> Checksum {
        Checksum(XxHash32::with_seed(0))
    }

    pub fn update(&mut self, data: &[u8]) {
        self.0.write(data);
    }

    pub fn finalize(&self) -> u32 {
        self.0.finish() as u32
    }
}

impl Default for Checksum {
    fn default() -> Self {
        Checksum::new()
    }
}
