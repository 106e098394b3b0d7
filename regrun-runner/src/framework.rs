// Copyright (c) The regrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Contracts between regrun and the unit-test framework of the runtime under test.
//!
//! regrun does not know how tests are defined. It asks a [`TestFramework`] to load a module by
//! its dotted name, gets back a tree of [`TestNode`]s, and drives the leaves against a
//! [`ResultSink`]. The framework is constructed once at program entry and passed down by
//! reference.

use crate::sink::ResultSink;
use std::fmt::{self, Write as _};

/// The unit-test framework that loads and runs tests.
pub trait TestFramework: Send + Sync {
    /// Loads the module with the given dotted name into a tree of tests.
    ///
    /// Returns the exception raised while importing the module on failure.
    fn load(&self, module: &str) -> Result<TestNode, ExcInfo>;

    /// Returns true if the frame belongs to the framework or to regrun itself.
    ///
    /// Internal frames are dropped from tracebacks before they are formatted.
    fn is_internal_frame(&self, _frame: &Frame) -> bool {
        false
    }
}

/// A node in a loaded test tree.
pub enum TestNode {
    /// A container of tests, such as a module or a class.
    Suite {
        /// The name of the container.
        name: String,
        /// The tests and containers inside it, in discovery order.
        children: Vec<TestNode>,
    },
    /// A single runnable test.
    Case(Box<dyn TestCase>),
}

impl TestNode {
    /// Creates a suite node.
    pub fn suite(name: impl Into<String>, children: Vec<TestNode>) -> Self {
        TestNode::Suite {
            name: name.into(),
            children,
        }
    }

    /// Creates a leaf node.
    pub fn case(case: impl TestCase + 'static) -> Self {
        TestNode::Case(Box::new(case))
    }

    /// Returns the leaves of this tree in depth-first order.
    pub fn cases(&self) -> Vec<&dyn TestCase> {
        let mut out = Vec::new();
        self.collect_cases(&mut out);
        out
    }

    fn collect_cases<'a>(&'a self, out: &mut Vec<&'a dyn TestCase>) {
        match self {
            TestNode::Suite { children, .. } => {
                for child in children {
                    child.collect_cases(out);
                }
            }
            TestNode::Case(case) => out.push(case.as_ref()),
        }
    }

    /// Keeps only the leaves for which `keep` returns true, and removes suites left empty.
    ///
    /// Returns false if nothing is left in this tree.
    pub fn prune(&mut self, keep: &mut dyn FnMut(&dyn TestCase) -> bool) -> bool {
        match self {
            TestNode::Suite { children, .. } => {
                children.retain_mut(|child| child.prune(keep));
                !children.is_empty()
            }
            TestNode::Case(case) => keep(case.as_ref()),
        }
    }

    /// Runs every leaf in depth-first order, stopping early once the sink asks to.
    pub fn run(&self, sink: &mut dyn ResultSink) {
        match self {
            TestNode::Suite { children, .. } => {
                for child in children {
                    if sink.should_stop() {
                        return;
                    }
                    child.run(sink);
                }
            }
            TestNode::Case(case) => {
                if !sink.should_stop() {
                    case.run(sink);
                }
            }
        }
    }
}

impl fmt::Debug for TestNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestNode::Suite { name, children } => f
                .debug_struct("Suite")
                .field("name", name)
                .field("children", children)
                .finish(),
            TestNode::Case(case) => f
                .debug_struct("Case")
                .field("class_name", &case.class_name())
                .field("method_name", &case.method_name())
                .finish(),
        }
    }
}

/// A single runnable test.
pub trait TestCase {
    /// The qualified name of the class the test belongs to.
    fn class_name(&self) -> &str;

    /// The name of the test method, or `None` if the test is only identified by its class.
    fn method_name(&self) -> Option<&str>;

    /// Runs the test, reporting its start, outcome and stop to `sink`.
    fn run(&self, sink: &mut dyn ResultSink);
}

/// A stack frame in a traceback.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Frame {
    /// The source file.
    pub file: String,
    /// The line number.
    pub line: u32,
    /// The function name.
    pub function: String,
}

impl Frame {
    /// Creates a new frame.
    pub fn new(file: impl Into<String>, line: u32, function: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            function: function.into(),
        }
    }
}

/// An exception raised by a test, as reported by the framework.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExcInfo {
    /// The exception type, such as `AssertionError`.
    pub type_name: String,
    /// The exception message. May be empty.
    pub message: String,
    /// The traceback, outermost frame first.
    pub frames: Vec<Frame>,
}

impl ExcInfo {
    /// Creates an exception with an empty traceback.
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
            frames: Vec::new(),
        }
    }

    /// Appends a frame to the traceback.
    pub fn with_frame(mut self, frame: Frame) -> Self {
        self.frames.push(frame);
        self
    }

    /// Formats the exception as a traceback, leaving out frames for which `is_internal` is true.
    pub fn format(&self, is_internal: impl Fn(&Frame) -> bool) -> String {
        let mut out = String::new();
        let frames: Vec<&Frame> = self.frames.iter().filter(|f| !is_internal(f)).collect();
        if !frames.is_empty() {
            out.push_str("Traceback (most recent call last):\n");
            for frame in frames {
                // Writing to a String can't fail.
                let _ = writeln!(
                    out,
                    "  File \"{}\", line {}, in {}",
                    frame.file, frame.line, frame.function
                );
            }
        }
        out.push_str(&self.type_name);
        if !self.message.is_empty() {
            out.push_str(": ");
            out.push_str(&self.message);
        }
        out.push('\n');
        out
    }
}
