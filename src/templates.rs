use crate::recipes::RecipeType;

pub const DOWNLOAD_RECIPE: &str = include_str!("../templates/download.recipe");
pub const PKG_RECIPE: &str = include_str!("../templates/pkg.recipe");
pub const MUNKI_RECIPE: &str = include_str!("../templates/munki.recipe");
pub const INSTALL_RECIPE: &str = include_str!("../templates/install.recipe");
pub const JAMF_RECIPE: &str = include_str!("../templates/jamf.recipe");
pub const INTUNE_RECIPE: &str = include_str!("../templates/intune.recipe");
pub const FILEWAVE_RECIPE: &str = include_str!("../templates/filewave.recipe");

pub fn template_for(recipe_type: RecipeType) -> &'static str {
    match recipe_type {
        RecipeType::Download => DOWNLOAD_RECIPE,
        RecipeType::Pkg => PKG_RECIPE,
        RecipeType::Munki => MUNKI_RECIPE,
        RecipeType::Install => INSTALL_RECIPE,
        RecipeType::Jamf => JAMF_RECIPE,
        RecipeType::Intune => INTUNE_RECIPE,
        RecipeType::Filewave => FILEWAVE_RECIPE,
    }
}
