//! JSON parsing helper that reports the serde path of failures.

use anyhow::Result;

/// Parse JSON, attributing failures to the exact field path involved.
///
/// External APIs occasionally drift; "at path 'result.3.message.chat': ..."
/// beats a bare line/column when that happens.
pub fn parse_json<T: serde::de::DeserializeOwned>(body: &str) -> Result<T> {
    let jd = &mut serde_json::Deserializer::from_str(body);
    serde_path_to_error::deserialize(jd).map_err(|err| {
        let path = err.path().to_string();
        let inner = err.inner();
        if path.is_empty() || path == "." {
            anyhow::anyhow!("{inner}")
        } else {
            anyhow::anyhow!("at path '{path}': {inner}")
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Envelope {
        #[allow(dead_code)]
        items: Vec<Item>,
    }

    #[derive(Debug, Deserialize)]
    struct Item {
        #[allow(dead_code)]
        name: String,
    }

    #[test]
    fn error_includes_field_path() {
        let err = parse_json::<Envelope>(r#"{"items": [{"name": "ok"}, {"name": 7}]}"#)
            .expect_err("should fail on the numeric name");
        let msg = err.to_string();
        assert!(msg.contains("items.1.name"), "got: {msg}");
    }

    #[test]
    fn valid_json_passes_through() {
        let parsed: Envelope = parse_json(r#"{"items": []}"#).expect("valid");
        assert!(parsed.items.is_empty());
    }
}
