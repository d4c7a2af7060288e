mod redis;
mod search;
mod utils;
