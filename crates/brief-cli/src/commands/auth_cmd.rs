use crate::cli::AuthCommands;
use crate::commands::common::format_timestamp;
use crate::context::AppContext;
use crate::error::CliError;

pub async fn run_auth(command: AuthCommands, context: &AppContext) -> Result<(), CliError> {
    let auth = context.auth_client()?;
    let credentials = context.credentials(auth.clone())?;

    match command {
        AuthCommands::Login { email, password } => {
            let credential = auth.sign_in(&email, &password).await?;
            let email_label = credential
                .email
                .clone()
                .unwrap_or_else(|| "(no email)".to_string());
            credentials.sign_in(credential)?;
            println!("Signed in as {email_label}");
        }
        AuthCommands::Status => match credentials.current() {
            Some(credential) => {
                let email_label = credential.email.as_deref().unwrap_or("(no email)");
                println!(
                    "Signed in as {email_label} (access token expires {})",
                    format_timestamp(credential.expires_at)
                );
            }
            None => println!("Not signed in."),
        },
        AuthCommands::Logout => {
            if let Some(credential) = credentials.current() {
                // Local sign-out proceeds even when the server call fails.
                if let Err(error) = auth.sign_out(&credential.access_token).await {
                    tracing::warn!("Remote sign-out failed: {error}");
                }
            }
            credentials.sign_out()?;
            println!("Signed out");
        }
    }
    Ok(())
}
