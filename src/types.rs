use std::sync::Arc;
use tokio::sync::Mutex;
use songbird::Call;

pub type SharedCall = Arc<Mutex<Call>>;

pub(crate) type Generation = u64;
