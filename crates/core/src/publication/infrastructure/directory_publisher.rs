use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::publication::domain::detection_publisher::{
    DetectionPublisher, LabelMessage, PublicationError,
};
use crate::publication::domain::frame_encoder::EncodedImage;
use crate::shared::constants::LABELS_FILENAME;

/// Publishes to a directory: one image file per frame plus a label log.
///
/// Images are written as `frame_NNNNNN.<ext>`; labels go to `labels.csv`
/// as headerless `index,label` records. Both are replaced when a run
/// reuses the directory.
pub struct DirectoryPublisher {
    dir: PathBuf,
    labels: csv::Writer<File>,
}

impl DirectoryPublisher {
    pub fn create(dir: &Path) -> Result<Self, PublicationError> {
        fs::create_dir_all(dir)?;
        let labels = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(dir.join(LABELS_FILENAME))?;
        log::debug!("Publishing to {}", dir.display());
        Ok(Self {
            dir: dir.to_path_buf(),
            labels,
        })
    }

    pub fn image_path(&self, image: &EncodedImage) -> PathBuf {
        self.dir
            .join(format!("frame_{:06}.{}", image.frame_index, image.extension()))
    }
}

impl DetectionPublisher for DirectoryPublisher {
    fn publish_image(&mut self, image: &EncodedImage) -> Result<(), PublicationError> {
        fs::write(self.image_path(image), &image.bytes)?;
        Ok(())
    }

    fn publish_label(&mut self, message: &LabelMessage) -> Result<(), PublicationError> {
        self.labels
            .serialize((message.frame_index, message.label.as_str()))?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), PublicationError> {
        self.labels.flush()?;
        Ok(())
    }
}

impl Drop for DirectoryPublisher {
    fn drop(&mut self) {
        if let Err(e) = self.labels.flush() {
            log::warn!("Failed to flush {}: {e}", LABELS_FILENAME);
        }
    }
}
