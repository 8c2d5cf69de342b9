//! Server configuration, role and the accept loop.
//!
//! The command line is parsed once at boot into an immutable [`RedisServer`];
//! the mutable replication identity (replication ID, offset, replica set)
//! lives in [`crate::replication::ReplicationState`]. The role never changes
//! after startup.

use std::sync::Arc;

use regex::Regex;
use thiserror::Error;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::Mutex,
};
use tracing::{error, info};

use crate::connection::handle_client_connection;
use crate::key_value_store::KeyValueStore;
use crate::replication::{handle_master_connection, perform_handshake, ReplicationState};
use crate::state::State;

/// Errors that can occur during command-line argument parsing.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum CliError {
    #[error("invalid command line flag")]
    InvalidCommandLineFlag,
    #[error("invalid port flag value")]
    InvalidPortFlagValue,
    #[error("invalid master address")]
    InvalidMasterAddress,
    #[error("invalid master port")]
    InvalidMasterPort,
}

/// The process role, fixed at boot.
#[derive(Debug, PartialEq, Clone)]
pub enum RedisRole {
    Master,
    /// A replica of the master at (host, port)
    Replica((String, u16)),
}

impl RedisRole {
    /// The role name used by INFO, following Redis terminology.
    pub fn as_string(&self) -> &str {
        match self {
            RedisRole::Master => "master",
            RedisRole::Replica(_) => "slave",
        }
    }
}

/// Immutable server configuration parsed from the command line.
#[derive(Debug, Clone, PartialEq)]
pub struct RedisServer {
    pub port: u16,
    pub role: RedisRole,
    /// Directory for the optional RDB snapshot, surfaced via CONFIG GET
    pub dir: Option<String>,
    /// RDB filename, surfaced via CONFIG GET
    pub dbfilename: Option<String>,
    write_commands: Vec<&'static str>,
}

impl RedisServer {
    /// Parses command-line arguments into a server configuration.
    ///
    /// Recognized flags: `--port N` (default 6379), `--replicaof "host port"`
    /// or `"host:port"`, `--dir PATH`, `--dbfilename NAME`.
    pub fn new<I: IntoIterator<Item = String>>(command_line_args: I) -> Result<Self, CliError> {
        let mut iter = command_line_args.into_iter().skip(1);
        let mut port: Option<u16> = None;
        let mut role: Option<RedisRole> = None;
        let mut dir: Option<String> = None;
        let mut dbfilename: Option<String> = None;

        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--port" => {
                    let Some(port_str) = iter.next() else {
                        return Err(CliError::InvalidCommandLineFlag);
                    };

                    port = Some(validate_port(&port_str, CliError::InvalidPortFlagValue)?);
                }
                "--replicaof" => {
                    let Some(master_address) = iter.next() else {
                        return Err(CliError::InvalidCommandLineFlag);
                    };

                    role = Some(RedisRole::Replica(validate_master_address(
                        &master_address,
                    )?));
                }
                "--dir" => {
                    let Some(path) = iter.next() else {
                        return Err(CliError::InvalidCommandLineFlag);
                    };

                    dir = Some(path);
                }
                "--dbfilename" => {
                    let Some(name) = iter.next() else {
                        return Err(CliError::InvalidCommandLineFlag);
                    };

                    dbfilename = Some(name);
                }
                _ => return Err(CliError::InvalidCommandLineFlag),
            }
        }

        Ok(RedisServer {
            port: port.unwrap_or(6379),
            role: role.unwrap_or(RedisRole::Master),
            dir,
            dbfilename,
            write_commands: Vec::from(["SET", "DEL", "INCR", "XADD"]),
        })
    }

    /// Whether client connections to a replica must reject this command.
    pub fn is_write_command(&self, name: &str) -> bool {
        self.write_commands.contains(&name)
    }

    /// Runs the server until the process is terminated.
    ///
    /// A replica first connects to its master, performs the handshake and
    /// spawns the command-consumption task; both roles then accept client
    /// connections, one reader task each.
    pub async fn run(self) {
        let server = Arc::new(self);
        let store: Arc<Mutex<KeyValueStore>> = Arc::new(Mutex::new(KeyValueStore::new()));
        let state = Arc::new(Mutex::new(State::new()));
        let replication = Arc::new(ReplicationState::new());

        if let RedisRole::Replica((host, master_port)) = &server.role {
            let master_address = format!("{}:{}", host, master_port);

            let mut stream = match TcpStream::connect(&master_address).await {
                Ok(stream) => stream,
                Err(e) => {
                    error!(master = %master_address, error = %e, "failed to connect to master");
                    return;
                }
            };

            let leftover = match perform_handshake(&mut stream, server.port).await {
                Ok(buffer) => buffer,
                Err(e) => {
                    error!(master = %master_address, error = %e, "handshake failed");
                    return;
                }
            };

            info!(master = %master_address, "replicating from master");

            let server_clone = Arc::clone(&server);
            let replication_clone = Arc::clone(&replication);
            let store_clone = Arc::clone(&store);
            let state_clone = Arc::clone(&state);

            tokio::spawn(async move {
                handle_master_connection(
                    stream,
                    server_clone,
                    replication_clone,
                    store_clone,
                    state_clone,
                    leftover,
                )
                .await;
            });
        }

        let listener = match TcpListener::bind(format!("127.0.0.1:{}", server.port)).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(port = server.port, error = %e, "failed to bind TCP listener");
                return;
            }
        };

        info!(port = server.port, role = server.role.as_string(), "listening");

        loop {
            match listener.accept().await {
                Ok((stream, client_address)) => {
                    let server_clone = Arc::clone(&server);
                    let replication_clone = Arc::clone(&replication);
                    let store_clone = Arc::clone(&store);
                    let state_clone = Arc::clone(&state);

                    tokio::spawn(async move {
                        handle_client_connection(
                            stream,
                            server_clone,
                            replication_clone,
                            client_address.to_string(),
                            store_clone,
                            state_clone,
                        )
                        .await;
                    });
                }
                Err(e) => {
                    error!(error = %e, "accept failed");
                }
            }
        }
    }
}

fn validate_port(port: &str, error: CliError) -> Result<u16, CliError> {
    let port_number = port.parse::<u16>().map_err(|_| error.clone())?;

    if port_number == 0 {
        return Err(error);
    }

    Ok(port_number)
}

/// Parses a master address given as either `host port` or `host:port`, with
/// the host an IPv4 address or hostname.
fn validate_master_address(master_address: &str) -> Result<(String, u16), CliError> {
    let ipv4_regex =
        Regex::new(r"^(\d{1,3})\.(\d{1,3})\.(\d{1,3})\.(\d{1,3})$").expect("valid pattern");
    let hostname_regex = Regex::new(r"^[a-zA-Z0-9\-\.]+$").expect("valid pattern");

    let parts: Vec<&str> = if master_address.contains(':') {
        master_address.split(':').collect()
    } else {
        master_address.split_whitespace().collect()
    };

    if parts.len() != 2 {
        return Err(CliError::InvalidMasterAddress);
    }

    let address = parts[0];

    let valid_address = if let Some(caps) = ipv4_regex.captures(address) {
        caps.iter().skip(1).all(|octet| {
            octet
                .map(|m| m.as_str().parse::<u16>().map(|v| v <= 255).unwrap_or(false))
                .unwrap_or(false)
        })
    } else {
        hostname_regex.is_match(address)
    };

    if !valid_address {
        return Err(CliError::InvalidMasterAddress);
    }

    let port = validate_port(parts[1], CliError::InvalidMasterPort)?;

    Ok((address.to_string(), port))
}
