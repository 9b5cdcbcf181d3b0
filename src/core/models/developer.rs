use serde::{Deserialize, Serialize};

/// Developer entry as listed on a mod.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModDeveloperMeta {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    #[serde(default)]
    pub is_owner: bool,
}

/// Account record returned by `GET /v1/me`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeveloperMeta {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub admin: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModDeveloper {
    pub id: i64,
    pub username: String,
    pub display_name: String,
}

impl From<&ModDeveloperMeta> for ModDeveloper {
    fn from(m: &ModDeveloperMeta) -> Self {
        Self {
            id: m.id,
            username: m.username.clone(),
            display_name: m.display_name.clone(),
        }
    }
}

/// The authenticated account. `display_name` is the only mutable field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Developer {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub verified: bool,
    pub admin: bool,
}

impl From<DeveloperMeta> for Developer {
    fn from(m: DeveloperMeta) -> Self {
        Self {
            id: m.id,
            username: m.username,
            display_name: m.display_name,
            verified: m.verified,
            admin: m.admin,
        }
    }
}

/// Developers of one mod, with the owner resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModDeveloperManager {
    developers: Vec<ModDeveloper>,
    owner: Option<usize>,
}

impl ModDeveloperManager {
    pub fn new(data: &[ModDeveloperMeta]) -> Self {
        let developers = data.iter().map(ModDeveloper::from).collect();
        let owner = data.iter().rposition(|d| d.is_owner);
        Self { developers, owner }
    }

    /// The developer flagged as owner, or the first listed one. If several
    /// are flagged the last of them wins.
    pub fn owner(&self) -> Option<&ModDeveloper> {
        match self.owner {
            Some(idx) => self.developers.get(idx),
            None => self.developers.first(),
        }
    }

    pub fn list(&self) -> &[ModDeveloper] {
        &self.developers
    }
}
