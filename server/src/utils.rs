use rand::Rng;
use shared::GAME_CODE_LENGTH;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

// Get current timestamp in milliseconds
pub fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

// Random lowercase code players share to join the same friend game
pub fn generate_game_code() -> String {
    let mut rng = rand::thread_rng();
    (0..GAME_CODE_LENGTH)
        .map(|_| rng.gen_range(b'a'..=b'z') as char)
        .collect()
}
