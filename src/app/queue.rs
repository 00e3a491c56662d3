use tokio::sync::mpsc;

/// One unit of work: an article id and the site it is scraped from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueItem {
    pub article_id: String,
    pub source_url: String,
}

/// Producer side; cheap to clone into every request handler.
#[derive(Debug, Clone)]
pub struct JobQueue {
    sender: mpsc::UnboundedSender<QueueItem>,
}

#[derive(Debug)]
pub struct JobReceiver {
    receiver: mpsc::UnboundedReceiver<QueueItem>,
}

pub fn channel() -> (JobQueue, JobReceiver) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (JobQueue { sender }, JobReceiver { receiver })
}

impl JobQueue {
    pub fn enqueue(&self, article_id: impl Into<String>, source_url: impl Into<String>) {
        let item = QueueItem {
            article_id: article_id.into(),
            source_url: source_url.into(),
        };
        if let Err(err) = self.sender.send(item) {
            tracing::error!(article_id = %err.0.article_id, "job queue is closed; dropping item");
        }
    }
}

impl JobReceiver {
    pub async fn recv(&mut self) -> Option<QueueItem> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<QueueItem> {
        self.receiver.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}
