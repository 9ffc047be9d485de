//! Service URL helpers

use std::net::{IpAddr, Ipv4Addr, UdpSocket};

/// Best-effort non-loopback IPv4 address of this host
///
/// Opens a UDP socket toward a public address and reads the local address
/// the OS picked for the route. No packet is ever sent. Returns `None` when
/// no usable interface exists (e.g. airplane mode).
pub fn host_ipv4() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(ip) if !ip.is_loopback() && !ip.is_unspecified() => Some(ip),
        _ => None,
    }
}

/// The RTSP URL viewers should open, `127.0.0.1` when no address is known
pub fn stream_url(ip: Option<Ipv4Addr>, port: u16) -> String {
    let ip = ip.unwrap_or(Ipv4Addr::LOCALHOST);
    format!("rtsp://{}:{}/", ip, port)
}
