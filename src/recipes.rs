//! Recipe types and the dependency-closed build plan.
//!
//! Type relationships live in a declarative table rather than case logic:
//! `download` is the universal base, and the organization-deployment tier
//! additionally requires `pkg`. The table is the single source of truth,
//! so adding a deployment tier is a table edit plus a template.

use clap::ValueEnum;
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum)]
#[clap(rename_all = "lowercase")]
pub enum RecipeType {
    Download,
    Pkg,
    Munki,
    Install,
    Jamf,
    Intune,
    Filewave,
}

/// Direct requirements per type. Declaration order is also the stable
/// ordering used among peers in the build plan.
const DEPENDENCIES: &[(RecipeType, &[RecipeType])] = &[
    (RecipeType::Download, &[]),
    (RecipeType::Pkg, &[RecipeType::Download]),
    (RecipeType::Munki, &[RecipeType::Download]),
    (RecipeType::Install, &[RecipeType::Download]),
    (RecipeType::Jamf, &[RecipeType::Pkg]),
    (RecipeType::Intune, &[RecipeType::Pkg]),
    (RecipeType::Filewave, &[RecipeType::Pkg]),
];

impl RecipeType {
    pub fn all() -> impl Iterator<Item = RecipeType> {
        DEPENDENCIES.iter().map(|(ty, _)| *ty)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecipeType::Download => "download",
            RecipeType::Pkg => "pkg",
            RecipeType::Munki => "munki",
            RecipeType::Install => "install",
            RecipeType::Jamf => "jamf",
            RecipeType::Intune => "intune",
            RecipeType::Filewave => "filewave",
        }
    }

    fn direct_requirements(&self) -> &'static [RecipeType] {
        DEPENDENCIES
            .iter()
            .find(|(ty, _)| ty == self)
            .map(|(_, reqs)| *reqs)
            .unwrap_or(&[])
    }

    /// Transitive requirement closure, including the type itself.
    pub fn required_types(&self) -> BTreeSet<RecipeType> {
        let mut closed = BTreeSet::new();
        let mut pending = vec![*self];
        while let Some(ty) = pending.pop() {
            if closed.insert(ty) {
                pending.extend(ty.direct_requirements());
            }
        }
        closed
    }

    /// Deployment variants carry a visual presentation and get an icon.
    pub fn wants_icon(&self) -> bool {
        matches!(
            self,
            RecipeType::Munki | RecipeType::Jamf | RecipeType::Intune | RecipeType::Filewave
        )
    }
}

impl fmt::Display for RecipeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expand the requested set into a dependency-closed build plan ordered so
/// prerequisites precede dependents. Requesting any deployment variant
/// silently includes pkg and download; that mirrors the tier auto-enable
/// affordance and is deliberate.
pub fn resolve_build_plan(requested: &[RecipeType]) -> Vec<RecipeType> {
    let mut closed: BTreeSet<RecipeType> = BTreeSet::new();
    for ty in requested {
        closed.extend(ty.required_types());
    }
    // The declaration table already lists prerequisites before dependents,
    // so filtering it by membership yields a topological order.
    RecipeType::all().filter(|ty| closed.contains(ty)).collect()
}
