//! Zip archive comment carrying the parameters needed to decrypt entries:
//! `gf-encrypt:salt=<hex>;key-length=<int>[;algorithm=<name>]`.

pub const PREFIX: &str = "gf-encrypt:";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncryptionComment {
    pub salt_hex: Option<String>,
    pub key_length: Option<usize>,
    pub algorithm: Option<String>,
}

impl EncryptionComment {
    pub fn render(&self) -> String {
        let mut parts = Vec::new();
        if let Some(s) = &self.salt_hex {
            parts.push(format!("salt={s}"));
        }
        if let Some(k) = self.key_length {
            parts.push(format!("key-length={k}"));
        }
        if let Some(a) = &self.algorithm {
            parts.push(format!("algorithm={a}"));
        }
        format!("{PREFIX}{}", parts.join(";"))
    }

    /// `None` when the comment was not written by this tool.
    pub fn parse(comment: &str) -> Option<Self> {
        let body = comment.trim().strip_prefix(PREFIX)?;
        let mut out = Self::default();
        for field in body.split(';') {
            let Some((k, v)) = field.split_once('=') else {
                continue;
            };
            let v = v.trim();
            match k.trim() {
                "salt" if !v.is_empty() => out.salt_hex = Some(v.to_string()),
                "key-length" => out.key_length = v.parse().ok(),
                "algorithm" if !v.is_empty() => out.algorithm = Some(v.to_string()),
                _ => {}
            }
        }
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_default_cipher() {
        let c = EncryptionComment {
            salt_hex: Some("00ff".into()),
            key_length: Some(32),
            algorithm: None,
        };
        assert_eq!(c.render(), "gf-encrypt:salt=00ff;key-length=32");
        assert_eq!(EncryptionComment::parse(&c.render()), Some(c));
    }

    #[test]
    fn parse_tolerates_order_and_unknown_fields() {
        let c = EncryptionComment::parse("gf-encrypt:algorithm=des;x=1;key-length=8;salt=ab")
            .unwrap();
        assert_eq!(c.salt_hex.as_deref(), Some("ab"));
        assert_eq!(c.key_length, Some(8));
        assert_eq!(c.algorithm.as_deref(), Some("des"));
    }

    #[test]
    fn foreign_comments_ignored() {
        assert_eq!(EncryptionComment::parse("made by some zipper"), None);
        assert_eq!(EncryptionComment::parse(""), None);
    }
}
