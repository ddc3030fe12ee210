use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};

const SUFFIX_LEN: usize = 8;

/// Generates a human-readable order number of the form `ORD-YYYYMMDD-XXXXXXXX`, with an uppercase alphanumeric suffix.
pub fn new_order_number() -> String {
    let suffix: String =
        rand::thread_rng().sample_iter(&Alphanumeric).take(SUFFIX_LEN).map(|c| char::from(c).to_ascii_uppercase()).collect();
    format!("ORD-{}-{suffix}", Utc::now().format("%Y%m%d"))
}
