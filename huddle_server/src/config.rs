//! Command line and environment configuration

use crate::credentials::{TWILIO_API_BASE, TwilioIssuer};
use crate::rooms::DEFAULT_ROOM_CAPACITY;
use clap::Parser;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

#[derive(Parser, Debug, Clone)]
#[command(name = "huddle-signaling")]
#[command(about = "Room-based signaling server for WebRTC peer-to-peer sessions", long_about = None)]
pub struct Config {
    /// Address to bind
    #[arg(long, env = "HOST", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// Maximum number of members per room
    #[arg(
        long,
        env = "ROOM_CAPACITY",
        default_value_t = DEFAULT_ROOM_CAPACITY,
        value_parser = parse_capacity
    )]
    pub room_capacity: usize,

    /// Twilio account SID used to issue relay credentials
    #[arg(long, env = "ACCOUNT_SID")]
    pub twilio_account_sid: Option<String>,

    /// Twilio auth token used to issue relay credentials
    #[arg(long, env = "AUTH_TOKEN", hide_env_values = true)]
    pub twilio_auth_token: Option<String>,

    /// Twilio REST API base URL
    #[arg(long, env = "TWILIO_API_BASE", default_value = TWILIO_API_BASE)]
    pub twilio_api_base: String,
}

fn parse_capacity(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("room capacity must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8000,
            room_capacity: DEFAULT_ROOM_CAPACITY,
            twilio_account_sid: None,
            twilio_auth_token: None,
            twilio_api_base: TWILIO_API_BASE.to_string(),
        }
    }
}

impl Config {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// The relay credential issuer, if both Twilio secrets are set
    pub fn twilio_issuer(&self) -> Option<TwilioIssuer> {
        match (&self.twilio_account_sid, &self.twilio_auth_token) {
            (Some(sid), Some(token)) if !sid.is_empty() && !token.is_empty() => {
                Some(TwilioIssuer::new(sid, token).with_api_base(&self.twilio_api_base))
            }
            _ => None,
        }
    }
}
