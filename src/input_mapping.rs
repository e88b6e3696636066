use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::codes::{Input, Source};

/// User-chosen display names for the receiver's physical inputs.
///
/// Supplied by the configuration layer as a JSON object keyed by physical input name:
///
/// ```
/// use lexicon_av::InputMapping;
///
/// let inputs = InputMapping::from_json(r#"{ "BD": "Blu-ray", "RADIO": "DAB" }"#).unwrap();
///
/// assert_eq!(inputs.source_list(), vec!["Blu-ray", "DAB"]);
/// ```
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct InputMapping {
    names: BTreeMap<Input, String>,
}

impl InputMapping {
    /// Build a mapping. Blank display names are ignored.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = (Input, S)>,
        S: Into<String>,
    {
        let names = names
            .into_iter()
            .map(|(input, name)| (input, name.into().trim().to_string()))
            .filter(|(_, name)| !name.is_empty())
            .collect();

        InputMapping { names }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let names: BTreeMap<Input, String> = serde_json::from_str(json)?;

        Ok(InputMapping::new(names))
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// The name to present for a reported source.
    pub fn display_name(&self, source: Source) -> String {
        match source {
            Source::Input(input) => match self.names.get(&input) {
                Some(name) => name.clone(),
                None => input.name().to_string(),
            },
            Source::Unknown(_) => source.to_string(),
        }
    }

    /// Find the input for a requested source name: a configured display name, or else a
    /// physical input name.
    pub fn resolve(&self, name: &str) -> Option<Input> {
        self.names
            .iter()
            .find(|(_, display_name)| display_name.as_str() == name)
            .map(|(input, _)| *input)
            .or_else(|| name.parse().ok())
    }

    /// Selectable sources: the configured display names if any exist, otherwise every physical
    /// input name.
    pub fn source_list(&self) -> Vec<String> {
        if self.names.is_empty() {
            Input::ALL
                .iter()
                .map(|input| input.name().to_string())
                .collect()
        } else {
            self.names.values().cloned().collect()
        }
    }
}

// ================================================================================================
// Tests

#[cfg(test)]
mod tests {
    use super::InputMapping;
    use crate::codes::{Input, Source};

    #[test]
    fn empty_mapping_lists_physical_inputs() {
        let inputs = InputMapping::default();

        assert_eq!(inputs.source_list().len(), Input::ALL.len());
        assert_eq!(inputs.source_list()[0], "BD");
        assert_eq!(inputs.display_name(Source::Input(Input::Net)), "NET");
    }

    #[test]
    fn blank_names_are_ignored() {
        let inputs = InputMapping::from_json(r#"{ "BD": "Blu-ray", "CD": "  " }"#).unwrap();

        assert_eq!(inputs.source_list(), vec!["Blu-ray"]);
        assert_eq!(inputs.display_name(Source::Input(Input::Cd)), "CD");
    }

    #[test]
    fn resolve_accepts_display_and_physical_names() {
        let inputs = InputMapping::new([(Input::Radio, "DAB"), (Input::Display, "TV")]);

        assert_eq!(inputs.resolve("DAB"), Some(Input::Radio));
        assert_eq!(inputs.resolve("TV"), Some(Input::Display));
        assert_eq!(inputs.resolve("usb"), Some(Input::Usb));
        assert_eq!(inputs.resolve("Vinyl"), None);
    }

    #[test]
    fn unknown_source_displays_code() {
        let inputs = InputMapping::default();

        assert_eq!(inputs.display_name(Source::Unknown(0x1F)), "UNKNOWN_0x1F");
    }

    #[test]
    fn unknown_input_name_is_rejected() {
        assert!(InputMapping::from_json(r#"{ "PHONO": "Turntable" }"#).is_err());
    }
}
