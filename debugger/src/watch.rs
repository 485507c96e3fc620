//! Watch expressions and the reconstruction of their nested values.
//!
//! The debugger prints aggregate values as C-like text (`{a = 1, b = {c =
//! 2}}`). A single left-to-right pass over the token stream rebuilds that
//! text into a navigable tree. The pass is deliberately permissive rather
//! than a validating parser: the textual format is not contractually
//! stable, so malformed or truncated input yields a best-effort partial
//! tree instead of an error.

const VALUE_NOT_FOUND: &str = "Not found in current context";
const VALUE_NOT_EVALUATED: &str = "Execute to evaluate";

/// One node of a rebuilt value tree. Nodes live in the arena of their
/// [`WatchVar`] and address each other by index, parents included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchNode {
    pub name: String,
    /// Access path from the root expression, e.g. `point.x` or `arr[2]`.
    pub full_name: String,
    pub value: String,
    parent: Option<usize>,
    children: Vec<usize>,
}

impl WatchNode {
    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    pub fn children(&self) -> &[usize] {
        &self.children
    }
}

/// A single watch expression and the arena holding its value tree.
/// `nodes[0]` is always the root.
#[derive(Debug, Clone)]
pub struct WatchVar {
    expression: String,
    /// Display index assigned by the debugger, unbound when negative.
    gdb_index: i64,
    nodes: Vec<WatchNode>,
}

impl WatchVar {
    pub fn new(expression: impl Into<String>) -> Self {
        let expression = expression.into();
        let root = WatchNode {
            name: expression.clone(),
            full_name: expression.clone(),
            value: VALUE_NOT_EVALUATED.to_string(),
            parent: None,
            children: Vec::new(),
        };
        Self {
            expression,
            gdb_index: -1,
            nodes: vec![root],
        }
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn gdb_index(&self) -> i64 {
        self.gdb_index
    }

    pub fn set_gdb_index(&mut self, index: i64) {
        self.gdb_index = index;
    }

    pub fn is_bound(&self) -> bool {
        self.gdb_index >= 0
    }

    pub fn root(&self) -> &WatchNode {
        &self.nodes[0]
    }

    pub fn node(&self, index: usize) -> &WatchNode {
        &self.nodes[index]
    }

    pub fn nodes(&self) -> &[WatchNode] {
        &self.nodes
    }

    /// Rename the expression, keeping the (now stale) value tree shape.
    pub fn set_expression(&mut self, expression: &str) {
        self.expression = expression.to_string();
        self.nodes[0].name = expression.to_string();
        self.nodes[0].full_name = expression.to_string();
    }

    /// Drop the value tree. While a session is live a dropped watch reads
    /// as out of scope; otherwise it waits for the next run.
    pub fn invalidate(&mut self, executing: bool) {
        self.nodes.truncate(1);
        let root = &mut self.nodes[0];
        root.children.clear();
        root.value = if executing {
            VALUE_NOT_FOUND.to_string()
        } else {
            VALUE_NOT_EVALUATED.to_string()
        };
        self.gdb_index = -1;
    }

    /// Replace the value tree from the tokenized evaluation output.
    ///
    /// Single pass with an explicit ancestor stack:
    /// - an identifier token starts a new named child of the current parent;
    /// - `{` opens the pending child's own value if it has none yet, else
    ///   the parent's own value if that is empty, else an anonymous
    ///   `[index]` child; either way descent begins there;
    /// - `}` appends a close-marker child and pops back to the previous
    ///   parent;
    /// - `=` separates name from value and is consumed silently;
    /// - `,` ends the current value target;
    /// - anything else extends the current value target (space-joined), or
    ///   seeds a fresh anonymous child when there is none.
    pub fn rebuild(&mut self, tokens: &[String]) {
        self.nodes.truncate(1);
        self.nodes[0].children.clear();
        self.nodes[0].value.clear();

        let mut parent = 0usize;
        let mut current: Option<usize> = None;
        let mut stack: Vec<usize> = Vec::new();

        for token in tokens {
            let Some(ch) = token.chars().next() else {
                continue;
            };
            if ch == '_' || ch.is_ascii_alphabetic() || !ch.is_ascii() {
                let full_name = format!("{}.{}", self.nodes[parent].full_name, token);
                let child = self.push_child(parent, token.clone(), full_name, String::new());
                current = Some(child);
            } else if ch == '{' {
                if let Some(open) = current.filter(|&c| self.nodes[c].value.is_empty()) {
                    // `name = {...}`: the aggregate is that child's value
                    self.nodes[open].value.push('{');
                    stack.push(parent);
                    parent = open;
                } else if self.nodes[parent].value.is_empty() {
                    self.nodes[parent].value.push('{');
                } else {
                    let name = format!("[{}]", self.nodes[parent].children.len());
                    let full_name = format!("{}{}", self.nodes[parent].full_name, name);
                    let child = self.push_child(parent, name, full_name, "{".to_string());
                    stack.push(parent);
                    parent = child;
                }
                current = None;
            } else if ch == '}' {
                current = None;
                self.push_child(parent, String::new(), String::new(), "}".to_string());
                if let Some(previous) = stack.pop() {
                    parent = previous;
                }
            } else if ch == '=' {
                // field-name/value separator
            } else if ch == ',' {
                current = None;
            } else if let Some(node) = current {
                if self.nodes[node].value.is_empty() {
                    self.nodes[node].value = token.clone();
                } else {
                    self.nodes[node].value.push(' ');
                    self.nodes[node].value.push_str(token);
                }
            } else {
                let name = format!("[{}]", self.nodes[parent].children.len());
                let full_name = format!("{}{}", self.nodes[parent].full_name, name);
                self.push_child(parent, name, full_name, token.clone());
            }
        }
    }

    fn push_child(&mut self, parent: usize, name: String, full_name: String, value: String) -> usize {
        let index = self.nodes.len();
        self.nodes.push(WatchNode {
            name,
            full_name,
            value,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent].children.push(index);
        index
    }
}

/// All watch expressions of a session, in registration order.
#[derive(Debug, Default)]
pub struct WatchList {
    items: Vec<WatchVar>,
}

impl WatchList {
    pub fn items(&self) -> &[WatchVar] {
        &self.items
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut WatchVar> {
        self.items.iter_mut()
    }

    pub fn contains(&self, expression: &str) -> bool {
        self.items.iter().any(|w| w.expression() == expression)
    }

    /// Register a new expression; false when it already exists.
    pub fn add(&mut self, expression: &str) -> bool {
        if self.contains(expression) {
            return false;
        }
        self.items.push(WatchVar::new(expression));
        true
    }

    pub fn get(&self, expression: &str) -> Option<&WatchVar> {
        self.items.iter().find(|w| w.expression() == expression)
    }

    pub fn get_mut(&mut self, expression: &str) -> Option<&mut WatchVar> {
        self.items.iter_mut().find(|w| w.expression() == expression)
    }

    pub fn remove(&mut self, expression: &str) -> Option<WatchVar> {
        let index = self.items.iter().position(|w| w.expression() == expression)?;
        Some(self.items.remove(index))
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
