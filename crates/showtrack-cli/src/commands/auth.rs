use super::context::AppContext;
use super::prompts;
use crate::output::Output;
use crate::AuthCommands;
use color_eyre::Result;
use serde_json::json;
use showtrack_core::AuthSession;

pub async fn run_auth(cmd: AuthCommands, output: &Output) -> Result<()> {
    let mut ctx = AppContext::load().await?;
    match cmd {
        AuthCommands::Signup { email } => sign_up(&mut ctx.auth, email, output).await,
        AuthCommands::Login { email, no_persist } => {
            sign_in_interactive(&mut ctx.auth, email, !no_persist, output).await
        }
        AuthCommands::Logout => sign_out(&mut ctx.auth, output).await,
        AuthCommands::Whoami => whoami(&ctx.auth, output).await,
    }
}

fn email_or_prompt(email: Option<String>) -> Result<String> {
    match email {
        Some(email) if !email.trim().is_empty() => Ok(email.trim().to_string()),
        _ => prompts::prompt_required("Email"),
    }
}

async fn sign_up(auth: &mut AuthSession, email: Option<String>, output: &Output) -> Result<()> {
    let email = email_or_prompt(email)?;
    let password = prompts::prompt_new_password("Password")?;

    let outcome = auth
        .sign_up(&email, &password)
        .await
        .map_err(|e| color_eyre::eyre::eyre!("Sign-up failed: {}", e))?;

    if outcome.needs_confirmation() {
        output.success(format!("Account created for {}", email));
        output.info("Check your inbox to confirm the address, then run 'showtrack auth login'.");
    } else {
        output.success(format!("Account created and signed in as {}", email));
    }
    if !output.is_human() {
        output.json(&json!({
            "user": outcome.user,
            "needs_confirmation": outcome.needs_confirmation(),
        }));
    }
    Ok(())
}

/// Prompt for whatever is missing and sign in
pub async fn sign_in_interactive(
    auth: &mut AuthSession,
    email: Option<String>,
    persist: bool,
    output: &Output,
) -> Result<()> {
    let email = email_or_prompt(email)?;
    let password = prompts::prompt_password("Password")?;

    let user = auth
        .sign_in(&email, &password, persist)
        .await
        .map_err(|e| color_eyre::eyre::eyre!("Sign-in failed: {}", e))?;

    let who = user.email.clone().unwrap_or_else(|| user.id.clone());
    if persist {
        output.success(format!("Signed in as {}", who));
    } else {
        output.success(format!("Signed in as {} (session not saved)", who));
    }
    Ok(())
}

async fn sign_out(auth: &mut AuthSession, output: &Output) -> Result<()> {
    let was_signed_in = auth.is_signed_in();
    auth.sign_out()
        .await
        .map_err(|e| color_eyre::eyre::eyre!("Failed to clear local session: {}", e))?;

    if was_signed_in {
        output.success("Signed out");
    } else {
        output.info("Not signed in");
    }
    Ok(())
}

async fn whoami(auth: &AuthSession, output: &Output) -> Result<()> {
    if !auth.is_signed_in() {
        output.info("Not signed in. Run 'showtrack auth login'.");
        return Ok(());
    }

    let user = auth
        .current_user()
        .await
        .map_err(|e| color_eyre::eyre::eyre!("Failed to fetch user: {}", e))?;
    let expires_at = auth.session().map(|s| s.expires_at.to_rfc3339());

    if output.is_human() {
        output.info(format!("Email:      {}", user.email.as_deref().unwrap_or("-")));
        output.info(format!("User ID:    {}", user.id));
        output.info(format!("Created:    {}", user.created_at.as_deref().unwrap_or("-")));
        if let Some(expires_at) = expires_at {
            output.info(format!("Session:    valid until {}", expires_at));
        }
    } else {
        output.json(&json!({
            "user": user,
            "session_expires_at": expires_at,
            "persisted": auth.is_persisted(),
        }));
    }
    Ok(())
}
