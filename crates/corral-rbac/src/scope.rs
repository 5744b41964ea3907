use serde::{Deserialize, Serialize};

const VERB_ALL: &str = "*";
const VERB_GET: &str = "get";
const VERB_LIST: &str = "list";
const VERB_UPDATE: &str = "update";

/// The verb subset a cache instance accepts as meaningful.
///
/// `View` asks for read access; `Admin` asks for read plus update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    View,
    Admin,
}

impl Scope {
    /// Whether a rule's verb list satisfies this scope.
    ///
    /// The wildcard verb satisfies every scope. `View` needs `get` or
    /// `list`; `Admin` additionally needs `update`.
    pub fn satisfied_by(&self, verbs: &[String]) -> bool {
        if verbs.iter().any(|verb| verb == VERB_ALL) {
            return true;
        }
        let readable = verbs.iter().any(|verb| verb == VERB_GET || verb == VERB_LIST);
        match self {
            Scope::View => readable,
            Scope::Admin => readable && verbs.iter().any(|verb| verb == VERB_UPDATE),
        }
    }
}
