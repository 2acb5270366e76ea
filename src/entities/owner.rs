// 👤 Owner Contact Profile
//
// Every registered user carries one emergency/contact profile. The real
// channels stay hidden behind the masked display name until a searcher
// spends a credit to reveal them.

use serde::{Deserialize, Serialize};

// ============================================================================
// CONTACT CHANNELS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactChannel {
    Phone,
    Sms,
    Whatsapp,
    Email,
}

impl ContactChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactChannel::Phone => "phone",
            ContactChannel::Sms => "sms",
            ContactChannel::Whatsapp => "whatsapp",
            ContactChannel::Email => "email",
        }
    }
}

/// Contact profile: the phone/email values plus per-channel enable flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactProfile {
    pub phone: String,
    pub email: Option<String>,
    pub allow_phone: bool,
    pub allow_sms: bool,
    pub allow_whatsapp: bool,
    pub allow_email: bool,
}

impl ContactProfile {
    /// Phone-only profile with calls enabled, the signup default.
    pub fn phone_only(phone: &str) -> Self {
        ContactProfile {
            phone: phone.to_string(),
            email: None,
            allow_phone: true,
            allow_sms: false,
            allow_whatsapp: false,
            allow_email: false,
        }
    }

    /// The channels a reveal would actually disclose. An enabled email flag
    /// with no email address on file yields nothing.
    pub fn enabled_channels(&self) -> Vec<(ContactChannel, String)> {
        let mut channels = Vec::new();
        if self.allow_phone {
            channels.push((ContactChannel::Phone, self.phone.clone()));
        }
        if self.allow_sms {
            channels.push((ContactChannel::Sms, self.phone.clone()));
        }
        if self.allow_whatsapp {
            channels.push((ContactChannel::Whatsapp, self.phone.clone()));
        }
        if self.allow_email {
            if let Some(email) = &self.email {
                channels.push((ContactChannel::Email, email.clone()));
            }
        }
        channels
    }

    /// An owner is contactable iff a reveal would disclose at least one
    /// usable channel.
    pub fn is_contactable(&self) -> bool {
        !self.enabled_channels().is_empty()
    }
}

// ============================================================================
// REVEAL PAYLOAD
// ============================================================================

/// What a searcher receives after a successful paid reveal: the owner's
/// real name and only the channels they enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevealedContact {
    pub vehicle_id: String,
    pub owner_name: String,
    pub channels: Vec<RevealedChannel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevealedChannel {
    pub channel: ContactChannel,
    pub value: String,
}

impl RevealedContact {
    /// Build the reveal payload, or `None` when the profile has no usable
    /// channel (the owner is not contactable).
    pub fn build(vehicle_id: &str, owner_name: &str, contact: &ContactProfile) -> Option<Self> {
        let channels: Vec<RevealedChannel> = contact
            .enabled_channels()
            .into_iter()
            .map(|(channel, value)| RevealedChannel { channel, value })
            .collect();

        if channels.is_empty() {
            return None;
        }

        Some(RevealedContact {
            vehicle_id: vehicle_id.to_string(),
            owner_name: owner_name.to_string(),
            channels,
        })
    }
}

// ============================================================================
// NAME MASKING
// ============================================================================

/// Mask a display name for unpaid search results.
///
/// First name kept, last name reduced to its initial plus a period:
/// `"Riyaansh Mittal"` → `"Riyaansh M."`. A single-word name is returned
/// unchanged.
pub fn mask_display_name(name: &str) -> String {
    let mut parts = name.split_whitespace();
    let first = match parts.next() {
        Some(first) => first,
        None => return String::new(),
    };
    match parts.last() {
        Some(last) => match last.chars().next() {
            Some(initial) => format!("{} {}.", first, initial),
            None => first.to_string(),
        },
        None => first.to_string(),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_two_word_name() {
        assert_eq!(mask_display_name("Riyaansh Mittal"), "Riyaansh M.");
    }

    #[test]
    fn test_mask_single_word_name() {
        assert_eq!(mask_display_name("Riyaansh"), "Riyaansh");
    }

    #[test]
    fn test_mask_middle_names_collapse_to_last_initial() {
        assert_eq!(mask_display_name("Anil Kumar Sharma"), "Anil S.");
    }

    #[test]
    fn test_mask_empty_name() {
        assert_eq!(mask_display_name("   "), "");
    }

    #[test]
    fn test_enabled_channels_share_phone_value() {
        let mut contact = ContactProfile::phone_only("+919812345678");
        contact.allow_whatsapp = true;
        let channels = contact.enabled_channels();
        assert_eq!(channels.len(), 2);
        assert!(channels
            .iter()
            .all(|(_, value)| value == "+919812345678"));
    }

    #[test]
    fn test_email_flag_without_address_is_not_contactable() {
        let contact = ContactProfile {
            phone: "+919812345678".to_string(),
            email: None,
            allow_phone: false,
            allow_sms: false,
            allow_whatsapp: false,
            allow_email: true,
        };
        assert!(!contact.is_contactable());
        assert!(RevealedContact::build("v-1", "Asha Rao", &contact).is_none());
    }

    #[test]
    fn test_reveal_filters_to_enabled_channels() {
        let contact = ContactProfile {
            phone: "+919812345678".to_string(),
            email: Some("asha@example.com".to_string()),
            allow_phone: true,
            allow_sms: false,
            allow_whatsapp: false,
            allow_email: true,
        };
        let revealed = RevealedContact::build("v-1", "Asha Rao", &contact).unwrap();
        assert_eq!(revealed.channels.len(), 2);
        assert_eq!(revealed.owner_name, "Asha Rao");
        let kinds: Vec<ContactChannel> = revealed.channels.iter().map(|c| c.channel).collect();
        assert_eq!(kinds, vec![ContactChannel::Phone, ContactChannel::Email]);
    }
}
