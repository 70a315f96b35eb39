use lettre::Address;
use std::io::{self, Write};

/// Helper function to read a line from stdin
pub fn read_line() -> io::Result<String> {
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

/// Read a secret from the terminal without echo
pub fn read_password() -> io::Result<String> {
    rpassword::read_password()
}

/// Helper function to prompt for input with confirmation
pub fn prompt_with_confirmation(prompt: &str, confirmation: &str) -> io::Result<bool> {
    println!("{}", prompt);
    print!("{} (y/n): ", confirmation);
    io::stdout().flush()?;

    let response = read_line()?.to_lowercase();
    Ok(response.is_empty() || response == "y")
}

/// Validate a mailbox address using RFC 5321 rules
pub fn is_valid_email(email: &str) -> bool {
    !email.trim().is_empty() && email.parse::<Address>().is_ok()
}
