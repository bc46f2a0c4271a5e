//! Contact directory: display metadata for Skype users.

use tracing::debug;

use crate::common::types::{ContactRecord, UserData};

/// Contacts loaded at connect time, immutable for the session.
#[derive(Debug, Clone)]
pub struct ContactDirectory {
    contacts: Vec<ContactRecord>,
    /// Avatar URL for users not in the contact list; `%user` placeholder.
    avatar_url_template: String,
}

impl ContactDirectory {
    pub fn new(contacts: Vec<ContactRecord>, avatar_url_template: impl Into<String>) -> Self {
        Self {
            contacts,
            avatar_url_template: avatar_url_template.into(),
        }
    }

    /// Find a contact by person id or MRI.
    pub fn get_contact(&self, id: &str) -> Option<&ContactRecord> {
        self.contacts.iter().find(|c| c.matches(id))
    }

    pub fn contact_count(&self) -> usize {
        self.contacts.len()
    }

    /// Display name and avatar for a raw user id.
    ///
    /// Users outside the contact list are named after the part of the id
    /// following the first colon (`8:live:bob` -> `live:bob`).
    pub fn user_data(&self, raw_id: &str) -> UserData {
        if let Some(contact) = self.get_contact(raw_id) {
            return UserData {
                sender_name: contact.display_name.clone(),
                avatar_url: contact.avatar_url.clone(),
            };
        }

        match raw_id.split_once(':') {
            Some((_, name)) => {
                debug!(raw_id, "Sender not in contacts, deriving display name");
                UserData {
                    sender_name: name.to_string(),
                    avatar_url: Some(
                        self.avatar_url_template
                            .replace("%user", &urlencoding::encode(name)),
                    ),
                }
            }
            None => UserData {
                sender_name: raw_id.to_string(),
                avatar_url: None,
            },
        }
    }
}
