//! Dynamic `{{$...}}` token generators.
//!
//! Every occurrence generates a fresh value, so two `{{$guid}}` tokens in
//! one request produce two different UUIDs.

use chrono::Utc;
use fake::faker::internet::en::{SafeEmail, Username};
use fake::faker::name::en::{FirstName, LastName, Name};
use fake::Fake;
use rand::distr::Alphanumeric;
use rand::Rng;
use uuid::Uuid;

/// Value for a `$` token, or None when the name is not a known generator.
/// Unknown `$` names fall through to normal variable lookup.
pub fn dynamic_value(name: &str) -> Option<String> {
    match name {
        "$timestamp" => Some(Utc::now().timestamp().to_string()),
        "$isoTimestamp" => Some(Utc::now().to_rfc3339()),
        "$guid" | "$randomUUID" => Some(Uuid::new_v4().to_string()),
        "$randomInt" => Some(rand::rng().random_range(0..=1000).to_string()),
        "$randomAlphaNumeric" => {
            let c: String = rand::rng()
                .sample_iter(&Alphanumeric)
                .take(1)
                .map(char::from)
                .collect();
            Some(c)
        }
        "$randomEmail" => {
            let email: String = SafeEmail().fake();
            Some(email)
        }
        "$randomUserName" => {
            let user: String = Username().fake();
            Some(user)
        }
        "$randomFirstName" => {
            let first: String = FirstName().fake();
            Some(first)
        }
        "$randomLastName" => {
            let last: String = LastName().fake();
            Some(last)
        }
        "$randomFullName" => {
            let full: String = Name().fake();
            Some(full)
        }
        _ => None,
    }
}
