use std::path::{Path, PathBuf};

use serde::Serialize;

pub const BUILTIN_TEMPLATE_COUNT: usize = 18;
pub const DEFAULT_TEMPLATE_DIR: &str = "templates";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Template {
    pub id: String,
    pub file_name: String,
    pub alt: String,
}

/// The meme templates offered next to "upload photo", resolved against a
/// directory holding `template-N.jpg` files.
#[derive(Debug, Clone)]
pub struct TemplateCatalog {
    root: PathBuf,
    templates: Vec<Template>,
}

impl TemplateCatalog {
    pub fn builtin(root: impl Into<PathBuf>) -> Self {
        let templates = (1..=BUILTIN_TEMPLATE_COUNT)
            .map(|n| Template {
                id: n.to_string(),
                file_name: format!("template-{n}.jpg"),
                alt: format!("Meme Template {n}"),
            })
            .collect();
        Self {
            root: root.into(),
            templates,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    pub fn get(&self, id: &str) -> Option<&Template> {
        self.templates.iter().find(|template| template.id == id)
    }

    pub fn path_of(&self, id: &str) -> Option<PathBuf> {
        self.get(id).map(|template| self.root.join(&template.file_name))
    }
}

impl Default for TemplateCatalog {
    fn default() -> Self {
        Self::builtin(DEFAULT_TEMPLATE_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_lists_eighteen_templates() {
        let catalog = TemplateCatalog::builtin("/srv/memes");
        assert_eq!(catalog.templates().len(), 18);
        let last = catalog.get("18").unwrap();
        assert_eq!(last.file_name, "template-18.jpg");
        assert_eq!(last.alt, "Meme Template 18");
        assert_eq!(
            catalog.path_of("3").unwrap(),
            PathBuf::from("/srv/memes/template-3.jpg")
        );
        assert!(catalog.get("0").is_none());
        assert!(catalog.path_of("19").is_none());
    }
}
