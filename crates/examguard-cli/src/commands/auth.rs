use examguard_core::{ProctorError, Registration, Result};

use super::{Context, password_or_prompt, runtime};
use crate::GlobalArgs;

pub fn login(global: &GlobalArgs, email: &str, password: Option<String>) -> Result<()> {
    let ctx = Context::new(global)?;
    let password = password_or_prompt(password)?;
    let principal = runtime()?.block_on(ctx.session.login(email, &password))?;
    println!("Signed in as {} <{}>", principal.full_name, principal.email);
    Ok(())
}

pub fn logout(global: &GlobalArgs) -> Result<()> {
    let ctx = Context::new(global)?;
    ctx.session.logout()?;
    println!("Signed out.");
    Ok(())
}

pub fn whoami(global: &GlobalArgs) -> Result<()> {
    let ctx = Context::new(global)?;
    let principal = runtime()?
        .block_on(ctx.session.check_session())
        .ok_or(ProctorError::AuthenticationRejected)?;

    println!("id:        {}", principal.id);
    println!("email:     {}", principal.email);
    println!("name:      {}", principal.full_name);
    match principal.typing_baseline {
        Some(ms) => println!("baseline:  {ms:.1} ms flight time"),
        None => println!("baseline:  (not yet learned)"),
    }
    Ok(())
}

pub fn register(
    global: &GlobalArgs,
    email: &str,
    full_name: &str,
    password: Option<String>,
) -> Result<()> {
    let ctx = Context::new(global)?;
    let profile = Registration {
        email: email.to_string(),
        full_name: full_name.to_string(),
        password: password_or_prompt(password)?,
    };
    runtime()?.block_on(ctx.session.register(&profile))?;
    println!("Account created for {email}. Sign in with `examguard login {email}`.");
    Ok(())
}
