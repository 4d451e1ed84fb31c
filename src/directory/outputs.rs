//! Named outputs known to the directory service

use std::collections::BTreeMap;

use crate::config::OutputConfig;
use crate::protocol::StreamEndpoint;

/// Output name to the control endpoints of the hosts behind it.
///
/// A name with several hosts is a group: start/stop reach all of them.
#[derive(Debug, Clone, Default)]
pub struct OutputDirectory {
    outputs: BTreeMap<String, Vec<StreamEndpoint>>,
}

impl OutputDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(outputs: &[OutputConfig]) -> Self {
        let mut directory = Self::new();
        for output in outputs {
            directory.insert(output.name.clone(), output.hosts.clone());
        }
        directory
    }

    pub fn insert(&mut self, name: impl Into<String>, hosts: Vec<StreamEndpoint>) {
        self.outputs.insert(name.into(), hosts);
    }

    /// Output names in order
    pub fn names(&self) -> Vec<String> {
        self.outputs.keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.outputs.contains_key(name)
    }

    /// Control endpoints behind `name`
    pub fn hosts(&self, name: &str) -> Option<&[StreamEndpoint]> {
        self.outputs.get(name).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_ordered() {
        let directory = OutputDirectory::from_config(&[
            OutputConfig {
                name: "stage".into(),
                hosts: vec![StreamEndpoint::new("10.0.0.2", 5000)],
            },
            OutputConfig {
                name: "hall".into(),
                hosts: vec![
                    StreamEndpoint::new("10.0.0.3", 5000),
                    StreamEndpoint::new("10.0.0.4", 5000),
                ],
            },
        ]);

        assert_eq!(directory.names(), vec!["hall".to_string(), "stage".to_string()]);
        assert_eq!(directory.hosts("hall").map(<[_]>::len), Some(2));
        assert!(directory.hosts("lobby").is_none());
    }
}
