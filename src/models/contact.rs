use serde::{Deserialize, Serialize};

/// A contractor in the directory. Only `id` is guaranteed; imports are
/// frequently missing email or phone, and the email generator must cope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub service_area: Option<String>,
}

impl Contact {
    /// Display name for templating, with a generic fallback for nameless rows.
    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(n) if !n.trim().is_empty() => n,
            _ => "there",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_falls_back_when_blank() {
        let c = Contact {
            id: "c1".into(),
            name: Some("   ".into()),
            email: None,
            phone: None,
            service_area: None,
        };
        assert_eq!(c.display_name(), "there");
    }
}
