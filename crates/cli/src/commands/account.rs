//! Login, logout and registration.

use apagina_core::{BookId, GenreId, RegisterResult};
use apagina_storefront::register::{BookChoice, RegistrationForm};
use apagina_storefront::state::Storefront;

use super::CommandError;

/// Log in and merge the guest cart into the account's cart.
pub async fn login(
    storefront: &Storefront,
    identifier: &str,
    password: &str,
) -> Result<(), CommandError> {
    if !storefront.login(identifier, password).await {
        return Err(CommandError::from_last_error(
            storefront.auth().last_error(),
            "Falha no login.",
        ));
    }

    if let Some(user) = storefront.auth().user() {
        tracing::info!("Olá, {}!", user.username);
    }
    if let Some(message) = storefront.cart().last_error() {
        tracing::warn!("{message}");
    }
    tracing::info!("{} item(s) no carrinho", storefront.cart().item_count());
    Ok(())
}

pub async fn logout(storefront: &Storefront) {
    storefront.logout().await;
    tracing::info!("Sessão encerrada.");
}

pub fn whoami(storefront: &Storefront) {
    match storefront.auth().user() {
        Some(user) => tracing::info!("{} (id {})", user.username, user.id),
        None => tracing::info!("Visitante (não logado)"),
    }
}

/// Create an account from the picked books and genres.
///
/// Book titles are not needed to register, so the IDs stand in for them.
pub async fn register(
    storefront: &Storefront,
    username: String,
    email: String,
    password: &str,
    books: &[BookId],
    genres: &[GenreId],
) -> Result<(), CommandError> {
    let mut form = RegistrationForm::new();
    form.username = username;
    form.email = email;
    form.set_password(password);
    for &id in books {
        form.select_book(BookChoice {
            id,
            title: id.to_string(),
        });
    }
    for &id in genres {
        form.toggle_genre(id);
    }

    match storefront.register(&form).await {
        RegisterResult::Success => {
            tracing::info!("Conta criada! Faça login para continuar.");
            Ok(())
        }
        failure => {
            for message in failure.messages() {
                tracing::warn!("{message}");
            }
            Err(CommandError::Failed("Cadastro não realizado.".to_string()))
        }
    }
}
