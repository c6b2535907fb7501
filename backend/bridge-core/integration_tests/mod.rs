mod helpers;
mod server;
mod supervisor;
