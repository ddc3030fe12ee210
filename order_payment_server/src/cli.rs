use std::{env, env::VarError};

/// There's no real CLI for the server, so just do quick 'n dirty
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        // We don't expect any CLI args, so always print the help
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // Secrets are left off this list on purpose
    const DISPLAY_ENVS: [&str; 19] = [
        "RUST_LOG",
        "OPG_HOST",
        "OPG_PORT",
        "OPG_DATABASE_URL",
        "OPG_GATEWAY_URL",
        "OPG_GATEWAY_KEY_ID",
        "OPG_GATEWAY_TIMEOUT_SECS",
        "OPG_GATEWAY_MAX_ATTEMPTS",
        "OPG_GATEWAY_RETRY_DELAY_MS",
        "OPG_WEBHOOK_SIGNATURE_HEADER",
        "OPG_GATEWAY_IP_WHITELIST",
        "OPG_USE_X_FORWARDED_FOR",
        "OPG_USE_FORWARDED",
        "OPG_CURRENCY",
        "OPG_TAX_RATE_BPS",
        "OPG_SHIPPING_FEE",
        "OPG_FREE_SHIPPING_THRESHOLD",
        "OPG_STRICT_CAPTURE_AMOUNT",
        "OPG_NOTIFICATION_URL",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
