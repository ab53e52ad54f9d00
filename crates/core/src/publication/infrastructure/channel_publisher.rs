use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::publication::domain::detection_publisher::{
    DetectionPublisher, LabelMessage, PublicationError, Topic,
};
use crate::publication::domain::frame_encoder::EncodedImage;

/// Subscriber ends of the two topics.
pub struct Subscription {
    pub images: Receiver<EncodedImage>,
    pub labels: Receiver<LabelMessage>,
}

/// In-process publisher over two bounded channels.
///
/// Emission never blocks: when a topic is full the message is dropped and
/// reported as [`PublicationError::Full`].
pub struct ChannelPublisher {
    images: Sender<EncodedImage>,
    labels: Sender<LabelMessage>,
}

impl ChannelPublisher {
    pub fn new(capacity: usize) -> (Self, Subscription) {
        let (image_tx, image_rx) = crossbeam_channel::bounded(capacity.max(1));
        let (label_tx, label_rx) = crossbeam_channel::bounded(capacity.max(1));
        (
            Self {
                images: image_tx,
                labels: label_tx,
            },
            Subscription {
                images: image_rx,
                labels: label_rx,
            },
        )
    }
}

fn offer<T>(tx: &Sender<T>, msg: T, topic: Topic) -> Result<(), PublicationError> {
    tx.try_send(msg).map_err(|e| match e {
        TrySendError::Full(_) => PublicationError::Full { topic },
        TrySendError::Disconnected(_) => PublicationError::Disconnected { topic },
    })
}

impl DetectionPublisher for ChannelPublisher {
    fn publish_image(&mut self, image: &EncodedImage) -> Result<(), PublicationError> {
        offer(&self.images, image.clone(), Topic::Image)
    }

    fn publish_label(&mut self, message: &LabelMessage) -> Result<(), PublicationError> {
        offer(&self.labels, message.clone(), Topic::Label)
    }
}
