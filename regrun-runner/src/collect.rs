// Copyright (c) The regrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collecting the tests named by a list of specifiers.

use crate::{
    TestResult, TestSpecifier, TestStatus,
    errors::{RootdirError, SpecifierParseError},
    framework::{TestCase, TestFramework, TestNode},
};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use tracing::{debug, warn};

/// The tests collected from one file.
#[derive(Debug)]
pub struct CollectedFile {
    /// The dotted module name of the file.
    pub module: String,
    /// The loaded tree, pruned to the requested tests.
    pub tree: TestNode,
    /// The specifiers of the remaining leaves, in discovery order.
    pub tests: Vec<TestSpecifier>,
}

/// The result of collecting a list of specifiers.
#[derive(Debug, Default)]
pub struct Collection {
    /// Files with at least one requested test, in the order they were first named.
    pub files: Vec<CollectedFile>,
    /// One `ERROR` result for each file that failed to load.
    pub errors: Vec<TestResult>,
}

impl Collection {
    /// The total number of collected tests.
    pub fn test_count(&self) -> usize {
        self.files.iter().map(|file| file.tests.len()).sum()
    }

    /// Returns true if no tests were collected and no file failed to load.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.errors.is_empty()
    }

    /// Iterates over all collected tests.
    pub fn iter_tests(&self) -> impl Iterator<Item = &TestSpecifier> + '_ {
        self.files.iter().flat_map(|file| file.tests.iter())
    }
}

/// Loads test files through a [`TestFramework`] and prunes them to the requested tests.
pub struct Collector<'fw> {
    framework: &'fw dyn TestFramework,
    rootdir: Utf8PathBuf,
}

impl<'fw> Collector<'fw> {
    /// Creates a new collector. File paths are made relative to `rootdir` before being turned
    /// into module names.
    pub fn new(framework: &'fw dyn TestFramework, rootdir: &Utf8Path) -> Result<Self, RootdirError> {
        let rootdir = rootdir
            .canonicalize_utf8()
            .map_err(|error| RootdirError::new(rootdir, error))?;
        Ok(Self { framework, rootdir })
    }

    /// Parses and collects a list of specifier strings.
    pub fn collect_strings(
        &self,
        specifiers: &[impl AsRef<str>],
    ) -> Result<Collection, SpecifierParseError> {
        let specifiers = specifiers
            .iter()
            .map(|s| TestSpecifier::from_string(s.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.collect(&specifiers))
    }

    /// Collects the tests matching `specifiers`.
    pub fn collect(&self, specifiers: &[TestSpecifier]) -> Collection {
        let mut by_module: IndexMap<String, Vec<TestSpecifier>> = IndexMap::new();
        for specifier in specifiers {
            let module = self.module_name(specifier.file());
            let normalized = specifier.with_file(module.as_str());
            by_module.entry(module).or_default().push(normalized);
        }

        let mut collection = Collection::default();
        for (module, requested) in by_module {
            let mut tree = match self.framework.load(&module) {
                Ok(tree) => tree,
                Err(exc) => {
                    debug!(%module, "test file failed to load");
                    let param = exc.format(|frame| self.framework.is_internal_frame(frame));
                    collection.errors.push(
                        TestResult::new(requested[0].file_specifier(), TestStatus::Error)
                            .with_param(param),
                    );
                    continue;
                }
            };

            let mut tests = Vec::new();
            tree.prune(&mut |case: &dyn TestCase| match TestSpecifier::from_test(&module, case) {
                Ok(test_id) => {
                    let keep = requested.iter().any(|r| r.matches(&test_id));
                    if keep {
                        tests.push(test_id);
                    }
                    keep
                }
                Err(error) => {
                    warn!(%module, %error, "skipping test with invalid identifier");
                    false
                }
            });

            if tests.is_empty() {
                debug!(%module, "no requested tests found");
                continue;
            }
            collection.files.push(CollectedFile {
                module,
                tree,
                tests,
            });
        }
        collection
    }

    /// Turns a file component into a dotted module name.
    ///
    /// Only existing `.py` files are translated; anything else is assumed to already be a module
    /// name.
    pub fn module_name(&self, file: &str) -> String {
        let path = Utf8Path::new(file);
        if path.extension() != Some("py") || !path.is_file() {
            return file.to_owned();
        }
        let relative = match path.canonicalize_utf8() {
            Ok(canonical) => match canonical.strip_prefix(&self.rootdir) {
                Ok(relative) => relative.to_owned(),
                Err(_) => {
                    warn!(%file, rootdir = %self.rootdir, "test file is outside the root directory");
                    path.to_owned()
                }
            },
            Err(error) => {
                warn!(%file, %error, "failed to resolve test file");
                path.to_owned()
            }
        };
        let module = relative
            .with_extension("")
            .components()
            .map(|c| c.as_str())
            .filter(|c| !c.is_empty() && *c != "." && *c != "/")
            .collect::<Vec<_>>()
            .join(".");
        if module.is_empty() {
            file.to_owned()
        } else {
            module
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{Behavior, ScriptedFramework};
    use camino_tempfile::Utf8TempDir;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn framework() -> ScriptedFramework {
        ScriptedFramework::new()
            .with_module(
                "t",
                &[
                    ("C", "test_a", Behavior::Pass),
                    ("C", "test_b", Behavior::Fail),
                    ("D", "test_c", Behavior::Pass),
                ],
            )
            .with_module("pkg.u", &[("E", "test_d", Behavior::Pass)])
    }

    fn ids(collection: &Collection) -> Vec<String> {
        collection.iter_tests().map(|t| t.to_string()).collect()
    }

    fn collector(framework: &ScriptedFramework) -> Collector<'_> {
        Collector::new(framework, Utf8Path::new(".")).expect("current directory exists")
    }

    #[test]
    fn whole_file() {
        let framework = framework();
        let collection = collector(&framework)
            .collect_strings(&["t"])
            .expect("valid specifiers");
        assert_eq!(ids(&collection), vec!["t::C::test_a", "t::C::test_b", "t::D::test_c"]);
        assert!(collection.errors.is_empty());
    }

    #[test]
    fn selective() {
        let framework = framework();
        let collection = collector(&framework)
            .collect_strings(&["t::C::test_a", "pkg.u::E", "t::C::nonexistent"])
            .expect("valid specifiers");
        assert_eq!(ids(&collection), vec!["t::C::test_a", "pkg.u::E::test_d"]);
        assert_eq!(collection.files.len(), 2);
        assert_eq!(collection.files[0].tree.cases().len(), 1, "tree was pruned");
    }

    #[test]
    fn unknown_method_drops_file() {
        let framework = framework();
        let collection = collector(&framework)
            .collect_strings(&["t::X"])
            .expect("valid specifiers");
        assert!(collection.is_empty());
    }

    #[test]
    fn load_failure_becomes_error_result() {
        let framework = framework();
        let collection = collector(&framework)
            .collect_strings(&["missing::C::test_a"])
            .expect("valid specifiers");
        assert!(collection.files.is_empty());
        assert_eq!(collection.errors.len(), 1);
        let error = &collection.errors[0];
        assert_eq!(error.test_id.to_string(), "missing");
        assert_eq!(error.status, TestStatus::Error);
        let param = error.param.as_deref().expect("traceback recorded");
        assert!(param.contains("No module named 'missing'"), "param: {param}");
        assert!(!param.contains("unittest/loader.py"), "param: {param}");
    }

    #[test]
    fn invalid_specifier() {
        let framework = framework();
        let err = collector(&framework)
            .collect_strings(&["t::"])
            .expect_err("empty component");
        assert_eq!(err.input(), "t::");
    }

    #[test]
    fn paths_become_module_names() {
        let dir = Utf8TempDir::new().expect("temp dir created");
        fs::create_dir(dir.path().join("pkg")).expect("pkg dir created");
        let file = dir.path().join("pkg").join("u.py");
        fs::write(&file, "").expect("file written");

        let framework = framework();
        let collector = Collector::new(&framework, dir.path()).expect("rootdir exists");
        assert_eq!(collector.module_name(file.as_str()), "pkg.u");
        assert_eq!(collector.module_name("pkg.u"), "pkg.u");
        assert_eq!(
            collector.module_name("does/not/exist.py"),
            "does/not/exist.py",
            "missing files pass through untouched"
        );

        let spec = format!("{file}::E");
        let collection = collector
            .collect_strings(&[spec.as_str(), "pkg.u::E::test_d"])
            .expect("valid specifiers");
        assert_eq!(
            ids(&collection),
            vec!["pkg.u::E::test_d"],
            "path and dotted forms are merged into one file"
        );
    }

    #[test]
    fn missing_rootdir() {
        let framework = framework();
        Collector::new(&framework, Utf8Path::new("/nonexistent/regrun/rootdir"))
            .err()
            .expect("rootdir does not exist");
    }
}
