use std::net::IpAddr;
use std::net::Ipv4Addr;

const GREENHOUSE_PORT: &str = "GREENHOUSE_PORT";

const DEFAULT_PORT: u16 = 5000;

pub fn get_port() -> u16 {
    let port_from_env = std::env::var(GREENHOUSE_PORT);
    port_from_env.map_or(DEFAULT_PORT, |res| res.parse().unwrap_or(DEFAULT_PORT))
}

const GREENHOUSE_ADDR: &str = "GREENHOUSE_ADDR";

const DEFAULT_ADDR: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

pub fn get_addr() -> IpAddr {
    let addr_from_env = std::env::var(GREENHOUSE_ADDR);
    addr_from_env.map_or(DEFAULT_ADDR, |res| res.parse().unwrap_or(DEFAULT_ADDR))
}

const DEFAULT_READ_BUFFER_SIZE: usize = 4096;

pub fn get_default_read_buffer_size() -> usize {
    DEFAULT_READ_BUFFER_SIZE
}
