mod codec;
mod config;
mod liveness;
mod protocol;
mod supervisor;
