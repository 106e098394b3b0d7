// Copyright (c) The regrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! An in-memory framework whose tests follow a fixed script.

use crate::{
    framework::{ExcInfo, Frame, TestCase, TestFramework, TestNode},
    sink::ResultSink,
};
use indexmap::IndexMap;

#[derive(Copy, Clone, Debug)]
pub(crate) enum Behavior {
    Pass,
    Fail,
    Error,
    Skip(&'static str),
    ExpectedFailure,
    UnexpectedSuccess,
}

#[derive(Clone, Debug)]
pub(crate) struct ScriptedCase {
    class: String,
    method: Option<String>,
    behavior: Behavior,
}

impl ScriptedCase {
    pub(crate) fn new(class: &str, method: &str, behavior: Behavior) -> Self {
        Self {
            class: class.to_owned(),
            method: Some(method.to_owned()),
            behavior,
        }
    }

    pub(crate) fn class_only(class: &str, behavior: Behavior) -> Self {
        Self {
            class: class.to_owned(),
            method: None,
            behavior,
        }
    }

    fn exception(&self, type_name: &str, message: &str) -> ExcInfo {
        ExcInfo::new(type_name, message)
            .with_frame(Frame::new("unittest/case.py", 58, "testPartExecutor"))
            .with_frame(Frame::new(
                "t.py",
                7,
                self.method.as_deref().unwrap_or(&self.class),
            ))
    }
}

impl TestCase for ScriptedCase {
    fn class_name(&self) -> &str {
        &self.class
    }

    fn method_name(&self) -> Option<&str> {
        self.method.as_deref()
    }

    fn run(&self, sink: &mut dyn ResultSink) {
        sink.start_test(self);
        match self.behavior {
            Behavior::Pass => sink.add_success(self),
            Behavior::Fail => sink.add_failure(self, &self.exception("AssertionError", "assert False")),
            Behavior::Error => sink.add_error(self, &self.exception("ValueError", "bad value")),
            Behavior::Skip(reason) => sink.add_skip(self, reason),
            Behavior::ExpectedFailure => {
                sink.add_expected_failure(self, &self.exception("AssertionError", "known bug"))
            }
            Behavior::UnexpectedSuccess => sink.add_unexpected_success(self),
        }
        sink.stop_test(self);
    }
}

#[derive(Debug, Default)]
pub(crate) struct ScriptedFramework {
    modules: IndexMap<String, Vec<(String, String, Behavior)>>,
}

impl ScriptedFramework {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_module(mut self, name: &str, cases: &[(&str, &str, Behavior)]) -> Self {
        self.modules.insert(
            name.to_owned(),
            cases
                .iter()
                .map(|(class, method, behavior)| ((*class).to_owned(), (*method).to_owned(), *behavior))
                .collect(),
        );
        self
    }
}

impl TestFramework for ScriptedFramework {
    fn load(&self, module: &str) -> Result<TestNode, ExcInfo> {
        let cases = self.modules.get(module).ok_or_else(|| {
            ExcInfo::new("ModuleNotFoundError", format!("No module named '{module}'"))
                .with_frame(Frame::new("unittest/loader.py", 137, "loadTestsFromName"))
                .with_frame(Frame::new("<frozen importlib._bootstrap>", 1204, "_gcd_import"))
        })?;
        let mut classes: IndexMap<&str, Vec<TestNode>> = IndexMap::new();
        for (class, method, behavior) in cases {
            classes
                .entry(class.as_str())
                .or_default()
                .push(TestNode::case(ScriptedCase::new(class, method, *behavior)));
        }
        Ok(TestNode::suite(
            module,
            classes
                .into_iter()
                .map(|(class, children)| TestNode::suite(class, children))
                .collect(),
        ))
    }

    fn is_internal_frame(&self, frame: &Frame) -> bool {
        frame.file.starts_with("unittest/")
    }
}
