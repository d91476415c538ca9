use crate::error::Result;
use std::net::Ipv4Addr;
use tokio::net::UdpSocket;

const WOL_PORT: u16 = 9;

/// Build a Wake-on-LAN magic packet: six 0xFF bytes, then the MAC sixteen times
pub(crate) fn magic_packet(mac: [u8; 6]) -> [u8; 102] {
    let mut packet = [0xFFu8; 102];
    for chunk in packet[6..].chunks_exact_mut(6) {
        chunk.copy_from_slice(&mac);
    }
    packet
}

/// Broadcast a magic packet for `mac` on the local network
pub(crate) async fn wake(mac: [u8; 6]) -> Result<()> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
    socket.set_broadcast(true)?;
    let packet = magic_packet(mac);
    socket
        .send_to(&packet, (Ipv4Addr::BROADCAST, WOL_PORT))
        .await?;
    tracing::info!(
        "Sent Wake-on-LAN packet to {:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        mac[0],
        mac[1],
        mac[2],
        mac[3],
        mac[4],
        mac[5]
    );
    Ok(())
}
