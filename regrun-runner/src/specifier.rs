// Copyright (c) The regrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{errors::SpecifierParseError, framework::TestCase};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// The hierarchical identifier of a test: `file::Class::method`.
///
/// A specifier has at least one component, and no component is empty. Shorter specifiers select
/// every test below them: `t` selects all of file `t`, `t::C` selects every method of class `C`.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct TestSpecifier {
    components: Vec<String>,
}

impl TestSpecifier {
    /// The separator between components.
    pub const SEPARATOR: &'static str = "::";

    /// Parses a specifier from its `a::b::c` string form.
    pub fn from_string(s: &str) -> Result<Self, SpecifierParseError> {
        if s.is_empty() {
            return Err(SpecifierParseError::new(s, "specifier is empty"));
        }
        let components: Vec<String> = s.split(Self::SEPARATOR).map(str::to_owned).collect();
        if components.iter().any(String::is_empty) {
            return Err(SpecifierParseError::new(s, "specifier has an empty component"));
        }
        Ok(Self { components })
    }

    /// Builds a specifier out of already-split components.
    pub fn from_components(
        components: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self, SpecifierParseError> {
        let components: Vec<String> = components.into_iter().map(Into::into).collect();
        if components.is_empty() {
            return Err(SpecifierParseError::new("", "specifier is empty"));
        }
        if components
            .iter()
            .any(|c| c.is_empty() || c.contains(Self::SEPARATOR))
        {
            return Err(SpecifierParseError::new(
                components.join(Self::SEPARATOR),
                "specifier has an empty or ambiguous component",
            ));
        }
        Ok(Self { components })
    }

    /// Builds the specifier of a leaf test loaded from `file`.
    ///
    /// Leaves that only expose a class-level identifier produce a two-component specifier.
    pub fn from_test(file: &str, test: &dyn TestCase) -> Result<Self, SpecifierParseError> {
        let mut components = vec![file.to_owned(), test.class_name().to_owned()];
        if let Some(method) = test.method_name() {
            components.push(method.to_owned());
        }
        Self::from_components(components)
    }

    /// Returns a specifier for the whole file this one belongs to.
    pub fn file_specifier(&self) -> Self {
        Self {
            components: vec![self.file().to_owned()],
        }
    }

    /// Returns a copy of this specifier with the file component replaced.
    pub fn with_file(&self, file: impl Into<String>) -> Self {
        let mut components = self.components.clone();
        components[0] = file.into();
        Self { components }
    }

    /// The first component: the test file, either as a path or as a dotted module name.
    pub fn file(&self) -> &str {
        &self.components[0]
    }

    /// All components, in order.
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// The number of components.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Always false: specifiers have at least one component.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Returns true if the two specifiers agree on every component they both have.
    ///
    /// This is symmetric: a file-level specifier matches every test in the file, and a test
    /// matches the file-level specifier.
    pub fn matches(&self, other: &TestSpecifier) -> bool {
        self.components
            .iter()
            .zip(&other.components)
            .all(|(a, b)| a == b)
    }
}

impl fmt::Display for TestSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.components.join(Self::SEPARATOR))
    }
}

impl FromStr for TestSpecifier {
    type Err = SpecifierParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_string(s)
    }
}

impl TryFrom<String> for TestSpecifier {
    type Error = SpecifierParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_string(&s)
    }
}

impl From<TestSpecifier> for String {
    fn from(specifier: TestSpecifier) -> Self {
        specifier.to_string()
    }
}
