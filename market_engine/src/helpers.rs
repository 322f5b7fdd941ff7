use rand::Rng;

/// Generates a 24-character lowercase hex identifier. Used for order ids and test fixtures.
pub fn random_id() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 12] = rng.gen();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
