use std::collections::BTreeSet;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Group member that matches every handler
pub const TAG_ALL: &str = "all";
/// Handler tag that makes it match every expression
pub const TAG_ALWAYS: &str = "always";
/// Group member that matches handlers without tags
pub const TAG_UNTAGGED: &str = "!untagged";

/// Which handlers a notification goes to
///
/// An OR of groups, each group an AND of tags. The string form separates
/// groups with `|` and tags with `,`:
///
/// ```rust
/// use std::collections::BTreeSet;
/// use notifybox::dispatch::TagExpression;
///
/// let expr: TagExpression = "ops,eu | dev".parse().unwrap();
/// let tags = |t: &[&str]| t.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>();
///
/// assert!(expr.matches(&tags(&["ops", "eu", "db"])));
/// assert!(expr.matches(&tags(&["dev"])));
/// assert!(!expr.matches(&tags(&["ops"])));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagExpression {
    groups: Vec<BTreeSet<String>>,
    match_always: bool,
}

impl Default for TagExpression {
    fn default() -> Self {
        Self::any()
    }
}

impl TagExpression {
    /// The empty expression; selects every handler.
    pub fn any() -> Self {
        Self {
            groups: Vec::new(),
            match_always: true,
        }
    }

    /// Handlers carrying at least one of `tags`.
    pub fn any_of<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut expr = Self::any();
        for tag in tags {
            expr = expr.or([tag]);
        }
        expr
    }

    /// Handlers carrying every one of `tags`.
    pub fn all_of<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::any().or(tags)
    }

    /// Add an AND group. Empty groups are ignored.
    pub fn or<I, S>(mut self, group: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let group: BTreeSet<String> = group
            .into_iter()
            .map(|tag| Into::<String>::into(tag).trim().to_string())
            .filter(|tag| !tag.is_empty())
            .collect();
        if !group.is_empty() {
            self.groups.push(group);
        }
        self
    }

    /// Stop handlers tagged `always` from matching unconditionally.
    pub fn without_always(mut self) -> Self {
        self.match_always = false;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn groups(&self) -> &[BTreeSet<String>] {
        &self.groups
    }

    /// Whether a handler with `tags` is selected.
    pub fn matches(&self, tags: &BTreeSet<String>) -> bool {
        if self.groups.is_empty() {
            return true;
        }
        if self.match_always && tags.contains(TAG_ALWAYS) {
            return true;
        }

        self.groups.iter().any(|group| {
            if group.contains(TAG_ALL) {
                return true;
            }
            if group.contains(TAG_UNTAGGED) {
                // an untagged handler cannot satisfy any other member
                return tags.is_empty() && group.len() == 1;
            }
            !tags.is_empty() && group.iter().all(|tag| tags.contains(tag))
        })
    }
}

impl FromStr for TagExpression {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(s.split('|')
            .fold(Self::any(), |expr, group| expr.or(group.split(','))))
    }
}

impl fmt::Display for TagExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, group) in self.groups.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            let joined: Vec<&str> = group.iter().map(String::as_str).collect();
            f.write_str(&joined.join(","))?;
        }
        Ok(())
    }
}
