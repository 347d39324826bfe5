use bincode::{deserialize, serialize};
use clap::Parser;
use fishing_shared::{
    CastRequest, HookOutcome, Packet, Position, ServerEvent, PROTOCOL_VERSION,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

/// Scripted client: joins, casts once and prints events until the line is
/// pulled
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Player name to join with
    #[arg(short = 'n', long, default_value = "tester")]
    name: String,

    /// Cast target x
    #[arg(short = 'x', long, default_value = "400")]
    target_x: f32,

    /// Cast target y
    #[arg(short = 'y', long, default_value = "150")]
    target_y: f32,

    /// Cast charge between 0 and 1
    #[arg(short = 'p', long, default_value = "0.5")]
    power: f32,
}

async fn send(
    socket: &UdpSocket,
    packet: &Packet,
    server_addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = serialize(packet)?;
    socket.send_to(&data, server_addr).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Client socket bound to {}", socket.local_addr()?);

    let server_addr = args.server.parse::<SocketAddr>()?;

    println!("Sending connection request to {}", server_addr);
    send(
        &socket,
        &Packet::Connect {
            client_version: PROTOCOL_VERSION,
        },
        server_addr,
    )
    .await?;

    let mut buf = [0u8; 4096];

    let (len, _) = socket.recv_from(&mut buf).await?;
    let client_id = match deserialize::<Packet>(&buf[0..len])? {
        Packet::Connected { client_id } => client_id,
        other => {
            println!("Expected Connected but got: {:?}", other);
            return Ok(());
        }
    };
    println!("Connection accepted with client ID: {}", client_id);

    send(&socket, &Packet::JoinGame { name: args.name }, server_addr).await?;

    let mut my_id = None;
    let mut cast_sent = false;
    loop {
        let (len, _) = match timeout(Duration::from_secs(30), socket.recv_from(&mut buf)).await {
            Ok(received) => received?,
            Err(_) => {
                println!("No event received for 30 seconds, giving up");
                break;
            }
        };

        let event = match deserialize::<Packet>(&buf[0..len]) {
            Ok(Packet::Event(event)) => event,
            Ok(other) => {
                println!("Unexpected packet: {:?}", other);
                continue;
            }
            Err(e) => {
                println!("Failed to deserialize packet: {}", e);
                continue;
            }
        };

        match &event {
            ServerEvent::Welcome { player } => {
                println!("Joined as {} at {}", player.name, player.position);
                my_id = Some(player.id);
            }
            ServerEvent::WorldState { players, fish } => {
                println!("World: {} other players, {} fish", players.len(), fish.len());
            }
            ServerEvent::HookAttemptUpdate {
                threshold,
                roll,
                attempts_left,
                status,
            } => {
                println!(
                    "  {:?}: threshold {:.2}, roll {:.2}, {} attempts left",
                    status, threshold, roll, attempts_left
                );
            }
            ServerEvent::FishHooked { fish } => {
                println!("Hooked a {} ({:.1})! Reeling it in", fish.species, fish.size);
                send(
                    &socket,
                    &Packet::FinishHook {
                        outcome: HookOutcome::Caught,
                    },
                    server_addr,
                )
                .await?;
            }
            ServerEvent::CastFailed { reason } => {
                println!("Cast failed: {}", reason);
            }
            other => println!("Event {}: {:?}", other.name(), other),
        }

        if !cast_sent && matches!(event, ServerEvent::WorldState { .. }) {
            let request = CastRequest {
                power: Some(args.power),
                target: Some(Position::new(args.target_x, args.target_y)),
            };
            println!("Casting: {:?}", request);
            send(&socket, &Packet::StartCast(request), server_addr).await?;
            cast_sent = true;
        }

        let line_gone =
            matches!(event, ServerEvent::LineRemoved { player_id } if Some(player_id) == my_id);
        let rejected = matches!(event, ServerEvent::CastFailed { .. } | ServerEvent::Error { .. });
        if cast_sent && (line_gone || rejected) {
            break;
        }
    }

    println!("Sending disconnect request");
    send(&socket, &Packet::Disconnect, server_addr).await?;

    println!("Test client finished");
    Ok(())
}
