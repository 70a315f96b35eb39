use super::ImapCredentialStore;
use crate::modules::utils::io::{prompt_with_confirmation, read_line, read_password};
use crate::modules::utils::logging::format_sensitive;

/// Interactively store the shared inbox password in the keyring
pub fn setup_imap_credentials(secret_name: &str, default_username: &str) -> Result<(), String> {
    let store = ImapCredentialStore::new(secret_name)?;

    if store.is_initialized() {
        let replace = prompt_with_confirmation(
            &format!("Mailbox credentials '{}' already exist.", secret_name),
            "Replace them?",
        )
        .map_err(|e| format!("Failed to read input: {}", e))?;
        if !replace {
            println!("Keeping existing credentials.");
            return Ok(());
        }
    }

    println!("\n=== Reset Inbox Credentials ===");

    let username = loop {
        if default_username.is_empty() {
            println!("Enter IMAP username:");
        } else {
            println!("Enter IMAP username (default: {}):", default_username);
        }
        let input = read_line().map_err(|e| format!("Failed to read input: {}", e))?;
        if input.is_empty() && !default_username.is_empty() {
            break default_username.to_string();
        }
        if input.is_empty() || input.contains(' ') {
            println!("Username cannot be empty or contain spaces. Please try again.");
            continue;
        }
        break input;
    };

    // Limited number of confirmation attempts
    const MAX_ATTEMPTS: u32 = 3;
    let mut attempts = 0;
    let password = loop {
        println!("Enter IMAP password (or app password):");
        let password = read_password().map_err(|e| format!("Failed to read password: {}", e))?;
        println!("Confirm password:");
        let confirmation =
            read_password().map_err(|e| format!("Failed to read password: {}", e))?;

        if !password.is_empty() && password == confirmation {
            break password;
        }

        attempts += 1;
        if attempts >= MAX_ATTEMPTS {
            return Err("Too many mismatched attempts.".to_string());
        }
        println!(
            "Passwords are empty or do not match. {} attempts remaining.",
            MAX_ATTEMPTS - attempts
        );
    };

    store.store_password(&username, &password)?;
    println!(
        "Stored mailbox credentials for {} under '{}'.",
        format_sensitive(&username),
        secret_name
    );
    Ok(())
}
