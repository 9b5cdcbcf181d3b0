// ─── Index Models ───
// Wire payloads (`*Meta`) and the cached entities built from them.

mod base;
mod developer;
mod mods;
mod simple;
mod version;
mod version_manager;

pub use base::{BeginLoginInfo, Hydration, ModId, ModStatus, ModVersionString, Paginated, Platform};
pub use developer::{Developer, DeveloperMeta, ModDeveloper, ModDeveloperManager, ModDeveloperMeta};
pub use mods::{Mod, ModHandle, ModManager, ModMeta};
pub use simple::{
    SimpleMod, SimpleModMeta, SimpleModVersion, SimpleModVersionManager, SimpleModVersionMeta,
};
pub use version::{
    normalize_geode, Dependency, DependencyImportance, DependencyMeta, GdPlatformsMeta, GdVersion,
    GdVersionMeta, Incompatibility, IncompatibilityImportance, IncompatibilityMeta, ModVersion,
    ModVersionMeta,
};
pub use version_manager::{compare_versions, ModVersionManager, VersionManager};
