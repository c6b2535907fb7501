mod args;
mod uplink;
