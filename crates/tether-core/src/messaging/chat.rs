//! Chat delivery over peer RPC.
//!
//! Outgoing attachments are registered with the [`LocalFileStore`] and sent as
//! `fid:<id>` references. The receiver stores the message as-is and queues a
//! download for every reference; when a download completes the reference is
//! replaced by the local path.

use super::client::PeerRpcClient;
use super::envelope::RpcRequest;
use super::responder::RpcHandler;
use crate::error::{Result, TetherError};
use crate::events::{Event, EventSink};
use crate::files::{LocalFileStore, file_uri, parse_file_uri};
use crate::store::{PeerRecord, PeerStore};
use crate::transfer::{DownloadQueue, FileRef};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tether_crypto::verify::now_millis;
use tracing::{debug, info};

/// Mutation delivering one chat item.
pub const CREATE_CHAT_ITEM: &str =
    "mutation createChatItem($item: ChatItemInput!) { createChatItem(item: $item) { id } }";

const CREATE_CHAT_ITEM_FIELD: &str = "createChatItem";

/// One attached file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// Local path, or `fid:<id>` while the bytes are still on the sender
    pub uri: String,
    /// File name
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// MIME type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
}

/// Chat message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChatContent {
    /// Plain text
    Text {
        /// Message text
        text: String,
    },
    /// Images
    Images {
        /// Attached images
        items: Vec<Attachment>,
    },
    /// Arbitrary files
    Files {
        /// Attached files
        items: Vec<Attachment>,
    },
}

impl ChatContent {
    /// Attachments, empty for text.
    #[must_use]
    pub fn attachments(&self) -> &[Attachment] {
        match self {
            Self::Text { .. } => &[],
            Self::Images { items } | Self::Files { items } => items,
        }
    }

    /// Mutable attachments, empty for text.
    pub fn attachments_mut(&mut self) -> &mut [Attachment] {
        match self {
            Self::Text { .. } => &mut [],
            Self::Images { items } | Self::Files { items } => items,
        }
    }
}

/// A stored chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Message id
    pub id: String,
    /// The other side of the conversation
    pub peer_id: String,
    /// Body
    pub content: ChatContent,
    /// Creation time (ms since Unix epoch)
    pub created_at: i64,
}

/// `item` variable of [`CREATE_CHAT_ITEM`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatItemInput {
    id: String,
    content: ChatContent,
    created_at: i64,
}

/// Storage of chat messages.
pub trait MessageStore: Send + Sync {
    /// Store `message`. Returns `false` if its id already exists.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting fails.
    fn append(&self, message: ChatMessage) -> Result<bool>;

    /// Message by id.
    fn get(&self, id: &str) -> Option<ChatMessage>;

    /// Replace the body of message `id`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the message does not exist.
    fn update_content(&self, id: &str, content: ChatContent) -> Result<()>;

    /// Point every `fid:<file_id>` attachment of message `id` at `local`.
    /// Returns whether anything changed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the message does not exist.
    fn replace_file_uri(&self, id: &str, file_id: &str, local: &Path) -> Result<bool> {
        let mut message = self
            .get(id)
            .ok_or_else(|| TetherError::InvalidState(format!("unknown message {id}").into()))?;
        let mut changed = false;
        for item in message.content.attachments_mut() {
            if parse_file_uri(&item.uri) == Some(file_id) {
                item.uri = local.to_string_lossy().into_owned();
                changed = true;
            }
        }
        if changed {
            self.update_content(id, message.content)?;
        }
        Ok(changed)
    }
}

/// In-memory [`MessageStore`].
#[derive(Debug, Default)]
pub struct MemoryMessageStore {
    messages: DashMap<String, ChatMessage>,
}

impl MemoryMessageStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages exchanged with `peer_id`, oldest first.
    #[must_use]
    pub fn for_peer(&self, peer_id: &str) -> Vec<ChatMessage> {
        let mut out: Vec<ChatMessage> = self
            .messages
            .iter()
            .filter(|m| m.peer_id == peer_id)
            .map(|m| m.value().clone())
            .collect();
        out.sort_by_key(|m| m.created_at);
        out
    }
}

impl MessageStore for MemoryMessageStore {
    fn append(&self, message: ChatMessage) -> Result<bool> {
        match self.messages.entry(message.id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Ok(false),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(message);
                Ok(true)
            }
        }
    }

    fn get(&self, id: &str) -> Option<ChatMessage> {
        self.messages.get(id).map(|m| m.value().clone())
    }

    fn update_content(&self, id: &str, content: ChatContent) -> Result<()> {
        let mut message = self
            .messages
            .get_mut(id)
            .ok_or_else(|| TetherError::InvalidState(format!("unknown message {id}").into()))?;
        message.content = content;
        Ok(())
    }
}

/// Sends chat messages to paired peers.
#[derive(Clone)]
pub struct ChatSender {
    client: PeerRpcClient,
    peers: Arc<dyn PeerStore>,
    files: Arc<dyn LocalFileStore>,
    messages: Arc<dyn MessageStore>,
}

impl ChatSender {
    /// Create a sender.
    #[must_use]
    pub fn new(
        client: PeerRpcClient,
        peers: Arc<dyn PeerStore>,
        files: Arc<dyn LocalFileStore>,
        messages: Arc<dyn MessageStore>,
    ) -> Self {
        Self {
            client,
            peers,
            files,
            messages,
        }
    }

    /// Rewrite local attachment paths to `fid:` references.
    fn to_wire(&self, content: &ChatContent) -> Result<ChatContent> {
        let mut wire = content.clone();
        for item in wire.attachments_mut() {
            if parse_file_uri(&item.uri).is_none() {
                let id = self.files.file_id_for(Path::new(&item.uri))?;
                item.uri = file_uri(&id);
            }
        }
        Ok(wire)
    }

    /// Deliver `content` to `peer_id` and record it locally.
    ///
    /// # Errors
    ///
    /// Returns an error if the peer is unknown or unpaired, an attachment is
    /// not a readable file, or the call fails.
    pub async fn send(&self, peer_id: &str, content: ChatContent) -> Result<ChatMessage> {
        let peer = self
            .peers
            .get(peer_id)
            .ok_or_else(|| TetherError::PeerNotFound(peer_id.to_owned()))?;

        let message = ChatMessage {
            id: uuid::Uuid::new_v4().to_string(),
            peer_id: peer.id.clone(),
            content,
            created_at: now_millis(),
        };
        let item = ChatItemInput {
            id: message.id.clone(),
            content: self.to_wire(&message.content)?,
            created_at: message.created_at,
        };
        let request = RpcRequest::new(CREATE_CHAT_ITEM, serde_json::json!({ "item": item }));

        self.client.call(&peer, &request).await?;
        self.messages.append(message.clone())?;
        info!(peer_id, message_id = %message.id, "chat message delivered");
        Ok(message)
    }
}

impl std::fmt::Debug for ChatSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSender").finish_non_exhaustive()
    }
}

/// Receives chat messages and queues their attachments.
pub struct ChatReceiver {
    messages: Arc<dyn MessageStore>,
    downloads: Arc<dyn DownloadQueue>,
    events: Arc<dyn EventSink>,
}

impl ChatReceiver {
    /// Create a receiver.
    #[must_use]
    pub fn new(
        messages: Arc<dyn MessageStore>,
        downloads: Arc<dyn DownloadQueue>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            messages,
            downloads,
            events,
        }
    }
}

#[async_trait]
impl RpcHandler for ChatReceiver {
    async fn handle(&self, caller: &PeerRecord, request: RpcRequest) -> Result<Value> {
        if !request.query.contains(CREATE_CHAT_ITEM_FIELD) {
            return Err(TetherError::Rpc("unsupported operation".into()));
        }
        let item: ChatItemInput = serde_json::from_value(
            request
                .variables
                .get("item")
                .cloned()
                .ok_or(TetherError::Serialization("missing item".into()))?,
        )?;

        let message = ChatMessage {
            id: item.id,
            peer_id: caller.id.clone(),
            content: item.content,
            created_at: item.created_at,
        };
        let message_id = message.id.clone();
        let refs: Vec<FileRef> = message
            .content
            .attachments()
            .iter()
            .filter_map(|a| {
                parse_file_uri(&a.uri).map(|id| FileRef {
                    id: id.to_owned(),
                    name: a.name.clone(),
                    size: a.size,
                })
            })
            .collect();

        if !self.messages.append(message)? {
            debug!(message_id, "duplicate chat message");
            return Ok(serde_json::json!({ CREATE_CHAT_ITEM_FIELD: { "id": message_id } }));
        }
        self.events.emit(Event::MessageReceived {
            peer_id: caller.id.clone(),
            message_id: message_id.clone(),
        });

        for file in refs {
            self.downloads.enqueue(file, &caller.id, &message_id).await?;
        }
        Ok(serde_json::json!({ CREATE_CHAT_ITEM_FIELD: { "id": message_id } }))
    }
}

impl std::fmt::Debug for ChatReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatReceiver").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullSink;
    use crate::store::tests::paired_record;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingQueue(Mutex<Vec<(FileRef, String, String)>>);

    #[async_trait]
    impl DownloadQueue for RecordingQueue {
        async fn enqueue(&self, file: FileRef, peer_id: &str, message_id: &str) -> Result<bool> {
            self.0
                .lock()
                .unwrap()
                .push((file, peer_id.to_owned(), message_id.to_owned()));
            Ok(true)
        }
    }

    fn attachment(uri: &str) -> Attachment {
        Attachment {
            uri: uri.into(),
            name: "photo.jpg".into(),
            size: 1234,
            mime: Some("image/jpeg".into()),
        }
    }

    fn create_request(id: &str, content: &ChatContent) -> RpcRequest {
        RpcRequest::new(
            CREATE_CHAT_ITEM,
            serde_json::json!({ "item": { "id": id, "content": content, "createdAt": 5 } }),
        )
    }

    #[test]
    fn test_content_wire_shape() {
        let text = ChatContent::Text { text: "hi".into() };
        assert_eq!(
            serde_json::to_value(&text).unwrap(),
            serde_json::json!({ "type": "text", "text": "hi" })
        );
        let images = ChatContent::Images {
            items: vec![attachment("fid:abc")],
        };
        let json = serde_json::to_value(&images).unwrap();
        assert_eq!(json["type"], "images");
        assert_eq!(json["items"][0]["uri"], "fid:abc");
    }

    #[test]
    fn test_replace_file_uri_only_touches_matching_refs() {
        let store = MemoryMessageStore::new();
        store
            .append(ChatMessage {
                id: "m1".into(),
                peer_id: "p".into(),
                content: ChatContent::Files {
                    items: vec![attachment("fid:a"), attachment("fid:b")],
                },
                created_at: 1,
            })
            .unwrap();

        assert!(
            store
                .replace_file_uri("m1", "a", Path::new("/downloads/photo.jpg"))
                .unwrap()
        );
        assert!(!store.replace_file_uri("m1", "zzz", Path::new("/x")).unwrap());

        let items = store.get("m1").unwrap().content.attachments().to_vec();
        assert_eq!(items[0].uri, "/downloads/photo.jpg");
        assert_eq!(items[1].uri, "fid:b");
        assert!(store.replace_file_uri("missing", "a", Path::new("/x")).is_err());
    }

    #[tokio::test]
    async fn test_receiver_stores_and_queues_refs() {
        let messages = Arc::new(MemoryMessageStore::new());
        let queue = Arc::new(RecordingQueue::default());
        let receiver = ChatReceiver::new(messages.clone(), queue.clone(), Arc::new(NullSink));
        let caller = paired_record("sender");

        let content = ChatContent::Images {
            items: vec![attachment("fid:f1"), attachment("/not/a/ref.jpg")],
        };
        let data = receiver
            .handle(&caller, create_request("m1", &content))
            .await
            .unwrap();
        assert_eq!(data["createChatItem"]["id"], "m1");

        let stored = messages.get("m1").unwrap();
        assert_eq!(stored.peer_id, "sender");
        assert_eq!(stored.content, content);

        let queued = queue.0.lock().unwrap().clone();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].0.id, "f1");
        assert_eq!(queued[0].0.size, 1234);
        assert_eq!(queued[0].1, "sender");
        assert_eq!(queued[0].2, "m1");
    }

    #[tokio::test]
    async fn test_receiver_ignores_duplicates() {
        let messages = Arc::new(MemoryMessageStore::new());
        let queue = Arc::new(RecordingQueue::default());
        let receiver = ChatReceiver::new(messages, queue.clone(), Arc::new(NullSink));
        let caller = paired_record("sender");
        let content = ChatContent::Files {
            items: vec![attachment("fid:f1")],
        };

        receiver.handle(&caller, create_request("m1", &content)).await.unwrap();
        receiver.handle(&caller, create_request("m1", &content)).await.unwrap();
        assert_eq!(queue.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_receiver_rejects_other_operations() {
        let receiver = ChatReceiver::new(
            Arc::new(MemoryMessageStore::new()),
            Arc::new(RecordingQueue::default()),
            Arc::new(NullSink),
        );
        let err = receiver
            .handle(&paired_record("x"), RpcRequest::new("{ ping }", Value::Null))
            .await
            .unwrap_err();
        assert!(matches!(err, TetherError::Rpc(_)));
    }
}
