mod uplink;
