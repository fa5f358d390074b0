//! Thin terminal front end: stdin lines go to the server, server lines go
//! to stdout. All chat behavior lives server-side.
use std::io::Write;

use futures::SinkExt;
use sarau::chat::codec::LineCodec;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio_stream::StreamExt;
use tokio_util::codec::Framed;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = std::env::var("SARAU_ADDR").unwrap_or_else(|_| "127.0.0.1:55555".to_string());

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    print!("Escolha seu nickname: ");
    std::io::stdout().flush()?;
    let nickname = match stdin.next_line().await? {
        Some(line) if !line.trim().is_empty() => line.trim().to_owned(),
        _ => {
            eprintln!("Nickname não pode ser vazio!");
            return Ok(());
        }
    };

    let socket = match TcpStream::connect(&addr).await {
        Ok(socket) => socket,
        Err(e) => {
            eprintln!("Não foi possível conectar ao servidor ({addr}): {e}");
            return Ok(());
        }
    };
    let mut framed = Framed::new(socket, LineCodec);

    framed.send(nickname).await?;

    // The first reply decides the handshake: an ERRO line means rejection.
    match framed.next().await {
        Some(Ok(line)) if line.starts_with("ERRO") => {
            eprintln!("{line}");
            return Ok(());
        }
        Some(Ok(line)) => println!("{line}"),
        _ => {
            eprintln!("Conexão perdida com o servidor.");
            return Ok(());
        }
    }

    loop {
        tokio::select! {
            // A line from the server.
            frame = framed.next() => {
                match frame {
                    Some(Ok(line)) => {
                        println!("{line}");
                    }
                    Some(Err(e)) => {
                        eprintln!("Conexão perdida com o servidor: {e}");
                        break;
                    }
                    None => {
                        eprintln!("Conexão perdida com o servidor.");
                        break;
                    }
                }
            }

            // A line typed by the user.
            line = stdin.next_line() => {
                let Some(line) = line? else { break };
                let quitting = line.trim().eq_ignore_ascii_case("/quit");
                framed.send(line).await?;
                if quitting {
                    break;
                }
            }
        }
    }

    println!("Desconectado do servidor.");
    Ok(())
}
