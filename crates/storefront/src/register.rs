//! Registration form: selections and client-side validation.
//!
//! The form is checked locally before anything is sent, so an incomplete
//! form never costs a request.

use secrecy::{ExposeSecret, SecretString};

use apagina_core::{Book, BookId, Email, FieldError, Genre, GenreId, RegisterRequest};

/// Number of favorite books a new account must pick.
pub const REQUIRED_BOOKS: usize = 2;

/// Shortest accepted password, in characters.
pub const MIN_PASSWORD_CHARS: usize = 6;

pub const BOOKS_REQUIRED: &str = "Selecione exatamente 2 livros favoritos.";
pub const GENRE_REQUIRED: &str = "Selecione pelo menos 1 gênero favorito.";
const USERNAME_REQUIRED: &str = "Informe um nome de usuário.";
const EMAIL_INVALID: &str = "Informe um email válido.";
const PASSWORD_TOO_SHORT: &str = "A senha deve ter no mínimo 6 caracteres.";

/// A book picked from the search results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookChoice {
    pub id: BookId,
    pub title: String,
}

impl From<&Book> for BookChoice {
    fn from(book: &Book) -> Self {
        Self {
            id: book.id,
            title: book.title.clone(),
        }
    }
}

/// Everything the registration page collects.
#[derive(Debug)]
pub struct RegistrationForm {
    pub username: String,
    pub email: String,
    password: SecretString,
    books: Vec<BookChoice>,
    genres: Vec<GenreId>,
}

impl Default for RegistrationForm {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistrationForm {
    #[must_use]
    pub fn new() -> Self {
        Self {
            username: String::new(),
            email: String::new(),
            password: SecretString::from(String::new()),
            books: Vec::new(),
            genres: Vec::new(),
        }
    }

    pub fn set_password(&mut self, password: &str) {
        self.password = SecretString::from(password.to_string());
    }

    /// Pick a favorite book. Ignored once two are picked or if already picked.
    pub fn select_book(&mut self, choice: BookChoice) -> bool {
        if self.books.len() >= REQUIRED_BOOKS || self.books.iter().any(|b| b.id == choice.id) {
            return false;
        }
        self.books.push(choice);
        true
    }

    pub fn remove_book(&mut self, id: BookId) {
        self.books.retain(|b| b.id != id);
    }

    #[must_use]
    pub fn selected_books(&self) -> &[BookChoice] {
        &self.books
    }

    /// How many more books must be picked.
    #[must_use]
    pub fn books_missing(&self) -> usize {
        REQUIRED_BOOKS.saturating_sub(self.books.len())
    }

    /// Select a genre if unselected, unselect it otherwise.
    pub fn toggle_genre(&mut self, id: GenreId) {
        if let Some(pos) = self.genres.iter().position(|g| *g == id) {
            self.genres.remove(pos);
        } else {
            self.genres.push(id);
        }
    }

    #[must_use]
    pub fn selected_genres(&self) -> &[GenreId] {
        &self.genres
    }

    /// Check the form and build the request, or list every problem.
    ///
    /// # Errors
    ///
    /// Returns one `FieldError` per failed rule.
    pub fn validate(&self) -> Result<RegisterRequest, Vec<FieldError>> {
        let mut errors = Vec::new();

        if self.books.len() != REQUIRED_BOOKS {
            errors.push(FieldError::for_field("favoriteBookIds", BOOKS_REQUIRED));
        }
        if self.genres.is_empty() {
            errors.push(FieldError::for_field("favoriteGenreIds", GENRE_REQUIRED));
        }

        let username = self.username.trim();
        if username.is_empty() {
            errors.push(FieldError::for_field("username", USERNAME_REQUIRED));
        }

        let email = match Email::parse(&self.email) {
            Ok(email) => Some(email),
            Err(_) => {
                errors.push(FieldError::for_field("email", EMAIL_INVALID));
                None
            }
        };

        if self.password.expose_secret().chars().count() < MIN_PASSWORD_CHARS {
            errors.push(FieldError::for_field("password", PASSWORD_TOO_SHORT));
        }

        match email {
            Some(email) if errors.is_empty() => Ok(RegisterRequest {
                username: username.to_string(),
                email,
                password: self.password.expose_secret().to_string(),
                favorite_book_ids: self.books.iter().map(|b| b.id).collect(),
                favorite_genre_ids: self.genres.clone(),
            }),
            _ => Err(errors),
        }
    }
}

/// Genres whose name contains `filter`, ignoring case.
#[must_use]
pub fn filter_genres<'a>(genres: &'a [Genre], filter: &str) -> Vec<&'a Genre> {
    let needle = filter.trim().to_lowercase();
    genres
        .iter()
        .filter(|g| g.name.to_lowercase().contains(&needle))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn choice(id: i32) -> BookChoice {
        BookChoice {
            id: BookId::new(id),
            title: format!("Livro {id}"),
        }
    }

    fn complete_form() -> RegistrationForm {
        let mut form = RegistrationForm::new();
        form.username = "leitora".to_string();
        form.email = "leitora@apagina.com.br".to_string();
        form.set_password("segredo");
        form.select_book(choice(1));
        form.select_book(choice(2));
        form.toggle_genre(GenreId::new(5));
        form
    }

    #[test]
    fn test_valid_form_builds_request() {
        let request = complete_form().validate().unwrap();
        assert_eq!(request.username, "leitora");
        assert_eq!(request.favorite_book_ids, vec![BookId::new(1), BookId::new(2)]);
        assert_eq!(request.favorite_genre_ids, vec![GenreId::new(5)]);
    }

    #[test]
    fn test_one_book_is_rejected() {
        let mut form = complete_form();
        form.remove_book(BookId::new(2));

        let errors = form.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].msg, BOOKS_REQUIRED);
        assert_eq!(form.books_missing(), 1);
    }

    #[test]
    fn test_book_selection_limits() {
        let mut form = RegistrationForm::new();
        assert!(form.select_book(choice(1)));
        assert!(!form.select_book(choice(1)));
        assert!(form.select_book(choice(2)));
        assert!(!form.select_book(choice(3)));
        assert_eq!(form.selected_books().len(), 2);
    }

    #[test]
    fn test_all_errors_reported() {
        let mut form = RegistrationForm::new();
        form.email = "sem-arroba".to_string();
        form.set_password("123");

        let messages: Vec<String> = form
            .validate()
            .unwrap_err()
            .into_iter()
            .map(|e| e.msg)
            .collect();
        assert_eq!(
            messages,
            vec![
                BOOKS_REQUIRED,
                GENRE_REQUIRED,
                USERNAME_REQUIRED,
                EMAIL_INVALID,
                PASSWORD_TOO_SHORT
            ]
        );
    }

    #[test]
    fn test_toggle_genre() {
        let mut form = RegistrationForm::new();
        form.toggle_genre(GenreId::new(1));
        form.toggle_genre(GenreId::new(2));
        form.toggle_genre(GenreId::new(1));
        assert_eq!(form.selected_genres(), &[GenreId::new(2)]);
    }

    #[test]
    fn test_filter_genres_ignores_case() {
        let genres = vec![
            Genre {
                id: GenreId::new(1),
                name: "Ficção Científica".to_string(),
            },
            Genre {
                id: GenreId::new(2),
                name: "Romance".to_string(),
            },
        ];
        let found = filter_genres(&genres, "FICÇÃO");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, GenreId::new(1));
        assert_eq!(filter_genres(&genres, "").len(), 2);
    }

    #[test]
    fn test_debug_hides_password() {
        assert!(!format!("{:?}", complete_form()).contains("segredo"));
    }
}
