//! Small UDP probe: pings the server, opens a connection, logs in and prints
//! whatever comes back.

use protocol::{decode_batch, Batch, Login, ProtocolRegistry, ProtocolVersion, Text};
use server::network::{
    CONNECTION_ACCEPTED, DATA_FRAME, DISCONNECT_NOTIFICATION, OPEN_CONNECTION, UNCONNECTED_PING,
    UNCONNECTED_PONG,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

async fn recv(socket: &UdpSocket, buf: &mut [u8]) -> Option<Vec<u8>> {
    match timeout(Duration::from_secs(2), socket.recv_from(buf)).await {
        Ok(Ok((len, _))) => Some(buf[..len].to_vec()),
        Ok(Err(e)) => {
            println!("Error receiving: {}", e);
            None
        }
        Err(_) => None,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let server_addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:19132".to_string())
        .parse::<SocketAddr>()?;
    let version = std::env::args()
        .nth(2)
        .and_then(|v| v.parse().ok())
        .map(ProtocolVersion)
        .unwrap_or(ProtocolVersion::LATEST);

    let protocols = ProtocolRegistry::with_defaults()?;
    let registry = protocols.registry(version)?;

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Client socket bound to {}", socket.local_addr()?);
    let mut buf = [0u8; 65_536];

    println!("Pinging {}", server_addr);
    socket.send_to(&[UNCONNECTED_PING], server_addr).await?;
    match recv(&socket, &mut buf).await {
        Some(reply) if reply.first() == Some(&UNCONNECTED_PONG) && reply.len() >= 3 => {
            println!("Pong: {}", String::from_utf8_lossy(&reply[3..]));
        }
        other => println!("Unexpected ping reply: {:?}", other),
    }

    socket.send_to(&[OPEN_CONNECTION], server_addr).await?;
    match recv(&socket, &mut buf).await {
        Some(reply) if reply == [CONNECTION_ACCEPTED] => println!("Connection accepted"),
        other => {
            println!("Connection refused: {:?}", other);
            return Ok(());
        }
    }

    let mut batch = Batch::new();
    batch.add(Login {
        protocol: version.0,
        display_name: "probe".to_string(),
        client_key: Vec::new(),
    });
    let mut frame = vec![DATA_FRAME];
    frame.extend(batch.encode(registry)?);
    println!("Logging in with protocol {}", version);
    socket.send_to(&frame, server_addr).await?;

    let mut chatted = false;
    while let Some(reply) = recv(&socket, &mut buf).await {
        match reply.split_first() {
            Some((&DATA_FRAME, batch)) => match decode_batch(batch, registry) {
                Ok(packets) => {
                    for packet in packets {
                        match packet {
                            Ok(packet) => println!("  {:?}", packet),
                            Err(e) => println!("  undecodable packet: {}", e),
                        }
                    }
                }
                Err(e) => println!("Bad batch: {}", e),
            },
            _ => println!("Unexpected datagram: {:02x?}", reply),
        }

        if !chatted {
            chatted = true;
            let mut chat = Batch::new();
            chat.add(Text::chat("probe", "hello from the probe"));
            let mut frame = vec![DATA_FRAME];
            frame.extend(chat.encode(registry)?);
            socket.send_to(&frame, server_addr).await?;
        }
    }

    socket
        .send_to(&[DISCONNECT_NOTIFICATION], server_addr)
        .await?;
    println!("Disconnected");
    Ok(())
}
