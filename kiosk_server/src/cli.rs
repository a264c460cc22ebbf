use std::env;

const README: &str = include_str!("./cli-help.txt");

// Only variables that never hold secrets. Tokens and the webhook secret are deliberately left out.
const DISPLAY_ENVS: [&str; 9] = [
    "RUST_LOG",
    "KIOSK_HOST",
    "KIOSK_PORT",
    "KIOSK_WEBHOOK_HMAC_CHECKS",
    "KIOSK_WEBHOOK_IP_WHITELIST",
    "KIOSK_USE_X_FORWARDED_FOR",
    "KIOSK_USE_FORWARDED",
    "KIOSK_QR_EXPIRY_MINS",
    "KIOSK_SSE_KEEPALIVE_SECS",
];

/// The server is configured entirely through the environment. Any command line argument prints the help text and the
/// current configuration instead of starting the server. Returns true if that happened.
pub fn handle_command_line_args() -> bool {
    if env::args().len() <= 1 {
        return false;
    }
    println!("\n{README}\n");
    println!("Current environment values (EXCLUDING variables that contain secrets):");
    for name in DISPLAY_ENVS {
        println!("  {name:<35} {:<15}", describe_env(name));
    }
    true
}

fn describe_env(name: &str) -> String {
    match env::var_os(name) {
        None => "Not set".into(),
        Some(value) => match value.into_string() {
            Ok(s) => s,
            Err(raw) => format!("Invalid value: {}", raw.to_string_lossy()),
        },
    }
}
