//! Add an annotation to a local research object.

use std::path::PathBuf;

use clap::Args;
use ro_sync_core::{Annotation, LocalRo, Subject};

use super::CommandError;

/// Annotate the research object or one of its resources
#[derive(Debug, Args)]
pub struct AnnotateCommand {
    /// Resource path relative to the RO root, or `.` for the RO itself
    resource: String,

    /// Annotation property, e.g. `title` or `type`
    property: String,

    value: String,

    /// RO directory
    #[arg(short, long, default_value = ".")]
    dir: PathBuf,
}

impl AnnotateCommand {
    pub fn run(&self) -> Result<(), CommandError> {
        let mut ro = LocalRo::open(&self.dir)?;
        let subject = Subject::parse(&self.resource)?;
        let annotation = Annotation::new(subject, self.property.as_str(), self.value.as_str());

        if ro.add_annotation(annotation.clone())? {
            println!("Annotation added: {}", annotation);
        } else {
            println!("Annotation already present: {}", annotation);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ro_sync_core::SyncError;
    use tempfile::tempdir;

    fn annotate(dir: PathBuf, resource: &str) -> AnnotateCommand {
        AnnotateCommand {
            resource: resource.into(),
            property: "type".into(),
            value: "Test file".into(),
            dir,
        }
    }

    #[test]
    fn test_annotate_resource() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().to_path_buf();
        LocalRo::create(&root, "ro").unwrap();
        std::fs::write(root.join("a.txt"), "a").unwrap();

        annotate(root.clone(), "a.txt").run().unwrap();
        annotate(root.clone(), ".").run().unwrap();

        let ro = LocalRo::open(&root).unwrap();
        assert_eq!(ro.annotations().len(), 2);
    }

    #[test]
    fn test_annotate_missing_resource_fails() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().to_path_buf();
        LocalRo::create(&root, "ro").unwrap();

        assert!(matches!(
            annotate(root, "missing.txt").run(),
            Err(CommandError::SyncError(SyncError::InvalidSubject(_)))
        ));
    }
}
