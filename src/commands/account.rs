use super::AppContext;
use crate::password;

pub async fn login(ctx: &AppContext, dni: &str, password: &str) -> Result<(), String> {
    match ctx
        .service
        .login_user(dni, password)
        .await
        .map_err(|e| e.to_string())?
    {
        Some(user) => {
            println!(
                "Logged in as {} ({})",
                user.nombre.as_deref().unwrap_or(&user.dni),
                user.id
            );
            Ok(())
        }
        None => Err("invalid DNI or password".to_string()),
    }
}

pub fn logout(ctx: &AppContext) -> Result<(), String> {
    ctx.service.logout();
    println!("Logged out");
    Ok(())
}

pub async fn whoami(ctx: &AppContext) -> Result<(), String> {
    let Some(session) = ctx.service.current_session() else {
        println!("Not logged in");
        return Ok(());
    };
    let user = ctx
        .service
        .current_user()
        .await
        .map_err(|e| e.to_string())?;
    match user {
        Some(user) => println!(
            "{} (dni {}), session until {}",
            user.nombre.as_deref().unwrap_or(&user.id),
            user.dni,
            session.expires_at.format("%Y-%m-%d %H:%M")
        ),
        None => println!("Session for unknown user {}", session.user_id),
    }
    Ok(())
}

pub fn hash_password(plain: &str) -> Result<(), String> {
    if plain.is_empty() {
        return Err("password must not be empty".to_string());
    }
    println!("{}", password::hash_password(plain));
    Ok(())
}
