use serde::Deserialize;

/// Body accepted by the script-backed POST endpoints.
///
/// Both fields are relayed to the script untouched. Absent fields decode as
/// empty strings; the payload is not checked for base64 well-formedness.
/// Field names are matched exactly and the body must hold a single JSON
/// value with nothing after it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct QueryEnvelope {
    /// Target database identifier.
    #[serde(default)]
    pub database: String,
    /// Opaque base64 payload.
    #[serde(default, rename = "base64value")]
    pub base64_value: String,
}

impl QueryEnvelope {
    /// Positional script arguments: `<database> <base64value>`.
    #[must_use]
    pub fn into_args(self) -> Vec<String> {
        vec![self.database, self.base64_value]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_wire_field_names() {
        let envelope: QueryEnvelope =
            match serde_json::from_str(r#"{"database":"mydb","base64value":"aGVsbG8="}"#) {
                Ok(e) => e,
                Err(e) => panic!("decode failed: {e}"),
            };
        assert_eq!(envelope.database, "mydb");
        assert_eq!(envelope.base64_value, "aGVsbG8=");
        assert_eq!(envelope.into_args(), vec!["mydb".to_owned(), "aGVsbG8=".to_owned()]);
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let envelope: QueryEnvelope = match serde_json::from_str(r#"{"database":"x","extra":1}"#) {
            Ok(e) => e,
            Err(e) => panic!("decode failed: {e}"),
        };
        assert_eq!(envelope.base64_value, "");
    }

    #[test]
    fn non_string_field_is_rejected() {
        let result = serde_json::from_str::<QueryEnvelope>(r#"{"database":5}"#);
        assert!(result.is_err(), "numeric database must not decode");
    }

    #[test]
    fn field_names_are_case_sensitive() {
        let envelope: QueryEnvelope =
            match serde_json::from_str(r#"{"Database":"mydb","Base64Value":"eA=="}"#) {
                Ok(e) => e,
                Err(e) => panic!("decode failed: {e}"),
            };
        assert_eq!(envelope, QueryEnvelope::default(), "capitalised keys must not populate fields");
    }

    #[test]
    fn trailing_bytes_after_the_object_are_rejected() {
        let result = serde_json::from_slice::<QueryEnvelope>(br#"{"database":"mydb"} {"database":"other"}"#);
        assert!(result.is_err(), "a second value after the envelope must not decode");
    }

    proptest::proptest! {
        #[test]
        fn proptest_arbitrary_bytes_never_panic(
            data in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..256usize),
        ) {
            let _ = serde_json::from_slice::<QueryEnvelope>(&data);
        }
    }
}
