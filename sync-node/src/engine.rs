//! The sync engine.
//!
//! Consumes watcher events and inbound peer messages, maintains the
//! baseline store, decides what to send or request, and drives conflict
//! resolution. Filesystem errors on a single file are logged and the file
//! is skipped; they never abort a scan or a session.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use lansync_core::{
    fsutil, Conflict, ConflictDetector, ConflictFile, FileRecord, PathFilter, Resolution,
    StateStore,
};
use lansync_types::{
    FileData, FileDelete, FileEntry, FileList, FileRequest, Hello, HelloAck, Message,
    MessageKind, PairRequest, PairResponse, PROTOCOL_VERSION,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::activity::{Activity, ActivityKind, ActivityLog};
use crate::config::Config;
use crate::error::NodeError;
use crate::net::{ConnectionManager, NetEvent, PeerSession};
use crate::paths::Paths;
use crate::watcher::{FileEvent, FileEventKind};

/// Largest file carried as a whole-file payload.
///
/// Payloads are base64-encoded inside a JSON frame capped at
/// [`lansync_types::MAX_FRAME_SIZE`]; 32 MiB of raw content stays safely
/// under that after inflation. Larger files are skipped with a warning.
pub const MAX_SYNC_FILE_SIZE: u64 = 32 * 1024 * 1024;

/// How long a just-applied entry suppresses the echo of its own write.
const SUPPRESS_TTL: Duration = Duration::from_secs(10);

struct AppliedEntry {
    hash: String,
    applied_at: Instant,
}

/// Orchestrates synchronization between the local filesystem and peers.
pub struct Engine {
    config: Arc<Config>,
    filter: PathFilter,
    store: Arc<StateStore>,
    detector: ConflictDetector,
    manager: Arc<ConnectionManager>,
    activity: ActivityLog,
    /// Writes we just applied from peers, keyed by (folder, rel_path).
    /// The watcher notices those writes; matching events must not be
    /// rebroadcast.
    just_applied: Mutex<HashMap<(PathBuf, String), AppliedEntry>>,
    cancel: CancellationToken,
}

impl Engine {
    /// Build the engine. Fails only on configuration errors.
    pub fn new(
        config: Arc<Config>,
        paths: &Paths,
        manager: Arc<ConnectionManager>,
        cancel: CancellationToken,
    ) -> Result<Arc<Self>, NodeError> {
        let filter = config.path_filter()?;
        let store = Arc::new(StateStore::new(paths.state_dir.clone()));
        let detector = ConflictDetector::new(
            config.device.name.clone(),
            config.sync.conflict_resolution,
            store.clone(),
        );

        Ok(Arc::new(Self {
            config,
            filter,
            store,
            detector,
            manager,
            activity: ActivityLog::new(),
            just_applied: Mutex::new(HashMap::new()),
            cancel,
        }))
    }

    /// Run the event pump until shutdown, then save state.
    pub async fn run(
        self: Arc<Self>,
        mut file_events: mpsc::Receiver<FileEvent>,
        mut net_events: mpsc::Receiver<NetEvent>,
    ) {
        if let Err(err) = self.store.load() {
            tracing::warn!("Failed to load state, starting fresh: {}", err);
        }
        for folder in self.config.enabled_folders() {
            self.store.init_folder(&folder.path);
        }
        tracing::info!("Sync engine started");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                Some(event) = file_events.recv() => {
                    self.handle_file_event(event).await;
                }
                Some(event) = net_events.recv() => {
                    self.clone().handle_net_event(event).await;
                }
                else => break,
            }
        }

        if let Err(err) = self.store.save() {
            tracing::error!("Failed to save state: {}", err);
        }
        tracing::info!("Sync engine stopped");
    }

    /// React to one connection-manager event.
    pub async fn handle_net_event(self: Arc<Self>, event: NetEvent) {
        match event {
            NetEvent::SessionUp(session) => {
                tracing::info!("Peer session up: {}", session.id());
                self.send_hello(&session).await;
            }
            NetEvent::SessionDown { id } => {
                tracing::info!("Peer session down: {}", id);
            }
            NetEvent::Frame { session, message } => {
                self.handle_message(message, &session).await;
            }
        }
    }

    /// Dispatch one inbound message from a peer session.
    pub async fn handle_message(self: Arc<Self>, message: Message, session: &PeerSession) {
        match message.kind {
            MessageKind::Hello => match message.decode_payload::<Hello>() {
                Ok(hello) => self.handle_hello(hello, session).await,
                Err(err) => tracing::error!("Failed to decode hello: {}", err),
            },
            MessageKind::HelloAck => match message.decode_payload::<HelloAck>() {
                Ok(ack) => {
                    tracing::info!(
                        "Hello acknowledged by {} (accepted: {})",
                        ack.device_name,
                        ack.accepted
                    );
                }
                Err(err) => tracing::error!("Failed to decode hello ack: {}", err),
            },
            MessageKind::PairRequest => match message.decode_payload::<PairRequest>() {
                Ok(request) => self.handle_pair_request(request, session).await,
                Err(err) => tracing::error!("Failed to decode pair request: {}", err),
            },
            MessageKind::PairResponse => match message.decode_payload::<PairResponse>() {
                Ok(response) => {
                    session.set_paired(response.accepted);
                    tracing::info!(
                        "Pairing with {} {}",
                        session.id(),
                        if response.accepted { "accepted" } else { "rejected" }
                    );
                }
                Err(err) => tracing::error!("Failed to decode pair response: {}", err),
            },
            MessageKind::FileList => match message.decode_payload::<FileList>() {
                Ok(list) => self.handle_file_list(list, session).await,
                Err(err) => tracing::error!("Failed to decode file list: {}", err),
            },
            MessageKind::FileRequest => match message.decode_payload::<FileRequest>() {
                Ok(request) => self.handle_file_request(request, session).await,
                Err(err) => tracing::error!("Failed to decode file request: {}", err),
            },
            MessageKind::FileData => match message.decode_payload::<FileData>() {
                Ok(data) => self.handle_file_data(data, &peer_label(session)).await,
                Err(err) => tracing::error!("Failed to decode file data: {}", err),
            },
            MessageKind::FileDelete => match message.decode_payload::<FileDelete>() {
                Ok(delete) => self.handle_remote_delete(delete, &peer_label(session)).await,
                Err(err) => tracing::error!("Failed to decode file delete: {}", err),
            },
            MessageKind::Ping => {
                // Normally answered inside the session read loop.
                if let Err(err) = session.send(&Message::control(MessageKind::Pong)).await {
                    tracing::debug!("Failed to answer ping: {}", err);
                }
            }
            MessageKind::Pong => {}
            MessageKind::Error => match message.decode_payload::<lansync_types::ErrorNotice>() {
                Ok(notice) => {
                    tracing::warn!(
                        "Peer {} reported error {}: {}",
                        session.id(),
                        notice.code,
                        notice.message
                    );
                }
                Err(err) => tracing::error!("Failed to decode error notice: {}", err),
            },
        }
    }

    async fn send_hello(&self, session: &PeerSession) {
        let hello = Hello {
            device_name: self.config.device.name.clone(),
            device_id: self.config.device.name.clone(),
            version: PROTOCOL_VERSION.to_string(),
        };
        match Message::new(MessageKind::Hello, &hello) {
            Ok(message) => {
                if let Err(err) = session.send(&message).await {
                    tracing::error!("Failed to send hello to {}: {}", session.id(), err);
                }
            }
            Err(err) => tracing::error!("Failed to encode hello: {}", err),
        }
    }

    async fn handle_hello(self: Arc<Self>, hello: Hello, session: &PeerSession) {
        tracing::info!("Received hello from {}", hello.device_name);
        session.set_device_name(&hello.device_name);

        let ack = HelloAck {
            device_name: self.config.device.name.clone(),
            device_id: self.config.device.name.clone(),
            accepted: true,
            reason: None,
        };
        match Message::new(MessageKind::HelloAck, &ack) {
            Ok(message) => {
                if let Err(err) = session.send(&message).await {
                    tracing::error!("Failed to send hello ack to {}: {}", session.id(), err);
                    return;
                }
            }
            Err(err) => {
                tracing::error!("Failed to encode hello ack: {}", err);
                return;
            }
        }

        if !self.config.sync.enabled {
            return;
        }

        // Greeted: enqueue a full sync of every enabled folder.
        for folder in self.config.enabled_folders() {
            let engine = self.clone();
            let path = folder.path.clone();
            tokio::spawn(async move {
                engine.sync_folder(&path).await;
            });
        }
    }

    async fn handle_pair_request(&self, request: PairRequest, session: &PeerSession) {
        tracing::info!("Pair request from {}", request.device_name);
        session.set_paired(true);

        let response = PairResponse {
            accepted: true,
            reason: None,
            public_key: None,
        };
        match Message::new(MessageKind::PairResponse, &response) {
            Ok(message) => {
                if let Err(err) = session.send(&message).await {
                    tracing::error!("Failed to send pair response: {}", err);
                }
            }
            Err(err) => tracing::error!("Failed to encode pair response: {}", err),
        }
    }

    /// Scan one folder and send its file list to every open session.
    pub async fn sync_folder(&self, folder_path: &Path) {
        tracing::info!("Starting folder sync for {}", folder_path.display());

        let list = self.build_file_list(folder_path);
        match Message::new(MessageKind::FileList, &list) {
            Ok(message) => self.manager.broadcast(&message).await,
            Err(err) => tracing::error!("Failed to encode file list: {}", err),
        }
    }

    /// Walk a folder and collect entries, skipping ignored paths, the
    /// root itself, and oversized files.
    pub fn build_file_list(&self, folder_path: &Path) -> FileList {
        let mut files = Vec::new();

        let walker = WalkDir::new(folder_path)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !self.filter.is_ignored(e.path()));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!("Skipping unreadable path during scan: {}", err);
                    continue;
                }
            };
            if entry.depth() == 0 {
                continue;
            }

            let meta = match fsutil::file_meta(entry.path(), folder_path) {
                Ok(meta) => meta,
                Err(err) => {
                    tracing::warn!(
                        "Failed to read metadata for {}: {}",
                        entry.path().display(),
                        err
                    );
                    continue;
                }
            };
            if !meta.is_dir && meta.size > MAX_SYNC_FILE_SIZE {
                tracing::warn!(
                    "Skipping {} ({} bytes): larger than the {} byte transfer limit",
                    meta.rel_path,
                    meta.size,
                    MAX_SYNC_FILE_SIZE
                );
                continue;
            }

            files.push(FileEntry {
                rel_path: meta.rel_path,
                size: meta.size,
                mod_time: meta.mod_time,
                hash: meta.hash,
                is_dir: meta.is_dir,
                permission: meta.permission,
                folder_path: folder_path.display().to_string(),
            });
        }

        FileList {
            folder_path: folder_path.display().to_string(),
            folder_name: folder_base_name(folder_path),
            files,
        }
    }

    async fn handle_file_list(&self, list: FileList, session: &PeerSession) {
        let Some(local_folder) = self.find_local_folder(&list.folder_name) else {
            tracing::debug!(
                "No matching local folder for received file list {:?}",
                list.folder_name
            );
            return;
        };

        if !self.config.sync.direction.can_receive() {
            tracing::debug!("Ignoring file list (send-only mode)");
            return;
        }

        tracing::debug!(
            "Received file list for {} ({} files) from {}",
            local_folder.display(),
            list.files.len(),
            peer_label(session)
        );

        for entry in &list.files {
            if has_parent_traversal(&entry.rel_path) {
                tracing::debug!("Dropping file list entry with traversal: {:?}", entry.rel_path);
                continue;
            }
            let local_path = local_folder.join(&entry.rel_path);

            let Ok(metadata) = std::fs::metadata(&local_path) else {
                // Nothing local; the remote version wins trivially.
                self.send_file_request(session, &list, entry).await;
                continue;
            };

            if entry.is_dir || metadata.is_dir() {
                continue;
            }

            let local_hash = match fsutil::hash_file(&local_path) {
                Ok(hash) => hash,
                Err(err) => {
                    tracing::warn!("Failed to hash {}: {}", local_path.display(), err);
                    continue;
                }
            };
            if local_hash == entry.hash {
                continue;
            }

            let remote = ConflictFile {
                size: entry.size,
                mod_time: entry.mod_time,
                hash: entry.hash.clone(),
                device_name: peer_label(session),
            };

            if let Some(conflict) = self.detector.detect(&local_folder, &entry.rel_path, &remote)
            {
                match self.detector.auto_resolve(&conflict) {
                    Ok(Resolution::KeepRemote) | Ok(Resolution::KeepBoth) => {
                        self.send_file_request(session, &list, entry).await;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        tracing::error!(
                            "Failed to auto-resolve conflict for {}: {}",
                            entry.rel_path,
                            err
                        );
                    }
                }
            } else {
                // No conflict: fetch when the remote copy is newer.
                let local_mod: DateTime<Utc> = metadata
                    .modified()
                    .map(Into::into)
                    .unwrap_or_else(|_| Utc::now());
                if entry.mod_time > local_mod {
                    self.send_file_request(session, &list, entry).await;
                }
            }
        }
    }

    async fn send_file_request(&self, session: &PeerSession, list: &FileList, entry: &FileEntry) {
        let request = FileRequest {
            folder_path: list.folder_path.clone(),
            folder_name: list.folder_name.clone(),
            rel_path: entry.rel_path.clone(),
        };
        match Message::new(MessageKind::FileRequest, &request) {
            Ok(message) => {
                if let Err(err) = session.send(&message).await {
                    tracing::error!(
                        "Failed to request {} from {}: {}",
                        entry.rel_path,
                        session.id(),
                        err
                    );
                }
            }
            Err(err) => tracing::error!("Failed to encode file request: {}", err),
        }
    }

    async fn handle_file_request(&self, request: FileRequest, session: &PeerSession) {
        // The requester echoes our own folder path back; only serve
        // paths inside folders we actually sync.
        let folder = PathBuf::from(&request.folder_path);
        if !self.config.enabled_folders().any(|f| f.path == folder) {
            tracing::debug!(
                "Dropping file request for unknown folder {:?}",
                request.folder_path
            );
            return;
        }
        if has_parent_traversal(&request.rel_path) {
            tracing::debug!("Dropping file request with traversal: {:?}", request.rel_path);
            return;
        }

        let full_path = folder.join(&request.rel_path);
        let metadata = match std::fs::metadata(&full_path) {
            Ok(metadata) => metadata,
            Err(err) => {
                tracing::error!("Failed to stat requested file {}: {}", full_path.display(), err);
                return;
            }
        };
        if metadata.is_dir() {
            tracing::debug!("Skipping directory in file request: {}", full_path.display());
            return;
        }
        if self.filter.is_ignored_under(&full_path, &folder) {
            tracing::debug!("Skipping ignored file in request: {}", full_path.display());
            return;
        }
        if metadata.len() > MAX_SYNC_FILE_SIZE {
            tracing::warn!(
                "Refusing to send {} ({} bytes): larger than the {} byte transfer limit",
                full_path.display(),
                metadata.len(),
                MAX_SYNC_FILE_SIZE
            );
            return;
        }

        let meta = match fsutil::file_meta(&full_path, &folder) {
            Ok(meta) => meta,
            Err(err) => {
                tracing::error!("Failed to read metadata for {}: {}", full_path.display(), err);
                return;
            }
        };
        let data = match std::fs::read(&full_path) {
            Ok(data) => data,
            Err(err) => {
                tracing::error!("Failed to read requested file {}: {}", full_path.display(), err);
                return;
            }
        };

        let payload = FileData {
            folder_path: request.folder_path.clone(),
            folder_name: request.folder_name.clone(),
            rel_path: request.rel_path.clone(),
            size: meta.size,
            mod_time: meta.mod_time,
            permission: meta.permission,
            hash: meta.hash,
            data,
            is_chunked: false,
            chunk_index: 0,
            total_chunks: 1,
        };
        match Message::new(MessageKind::FileData, &payload) {
            Ok(message) => {
                if let Err(err) = session.send(&message).await {
                    tracing::error!(
                        "Failed to send {} to {}: {}",
                        request.rel_path,
                        session.id(),
                        err
                    );
                }
            }
            Err(err) => tracing::error!("Failed to encode file data: {}", err),
        }
    }

    async fn handle_file_data(&self, data: FileData, peer_name: &str) {
        if !self.config.sync.direction.can_receive() {
            tracing::debug!("Ignoring incoming file {} (send-only mode)", data.rel_path);
            return;
        }
        let Some(local_folder) = self.find_local_folder(&data.folder_name) else {
            tracing::debug!(
                "No matching local folder for received file {:?}",
                data.folder_name
            );
            return;
        };
        if has_parent_traversal(&data.rel_path) {
            tracing::debug!("Dropping file data with traversal: {:?}", data.rel_path);
            return;
        }

        let full_path = local_folder.join(&data.rel_path);
        if let Some(parent) = full_path.parent() {
            if let Err(err) = fsutil::ensure_dir(parent) {
                tracing::error!("Failed to create directory {}: {}", parent.display(), err);
                return;
            }
        }

        if let Err(err) = std::fs::write(&full_path, &data.data) {
            tracing::error!("Failed to write file {}: {}", full_path.display(), err);
            return;
        }
        if let Err(err) = fsutil::apply_permission(&full_path, data.permission) {
            tracing::warn!(
                "Failed to set permissions on {}: {}",
                full_path.display(),
                err
            );
        }
        if let Err(err) = fsutil::set_mod_time(&full_path, data.mod_time) {
            tracing::warn!("Failed to set mod time on {}: {}", full_path.display(), err);
        }

        self.store.put(
            &local_folder,
            FileRecord {
                rel_path: data.rel_path.clone(),
                hash: data.hash.clone(),
                size: data.size,
                mod_time: data.mod_time,
                permission: data.permission,
                synced_at: Utc::now(),
                synced_from: peer_name.to_string(),
            },
        );

        // The write above will echo back through the watcher.
        self.just_applied.lock().insert(
            (local_folder.clone(), data.rel_path.clone()),
            AppliedEntry {
                hash: data.hash.clone(),
                applied_at: Instant::now(),
            },
        );

        self.activity.record(Activity {
            kind: ActivityKind::Received,
            file_name: base_name(&data.rel_path),
            folder_path: local_folder.display().to_string(),
            rel_path: data.rel_path.clone(),
            peer_name: peer_name.to_string(),
            timestamp: Utc::now(),
        });

        tracing::info!(
            "Received {} into {} from {}",
            data.rel_path,
            local_folder.display(),
            peer_name
        );
    }

    async fn handle_remote_delete(&self, delete: FileDelete, peer_name: &str) {
        if !self.config.sync.direction.can_receive() {
            tracing::debug!("Ignoring remote delete of {} (send-only mode)", delete.rel_path);
            return;
        }
        let Some(local_folder) = self.find_local_folder(&delete.folder_name) else {
            tracing::debug!(
                "No matching local folder for delete request {:?}",
                delete.folder_name
            );
            return;
        };
        if has_parent_traversal(&delete.rel_path) {
            tracing::debug!("Dropping delete with traversal: {:?}", delete.rel_path);
            return;
        }

        let full_path = local_folder.join(&delete.rel_path);
        if let Err(err) = std::fs::remove_file(&full_path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::error!("Failed to delete {}: {}", full_path.display(), err);
                return;
            }
        }

        self.store.remove(&local_folder, &delete.rel_path);

        self.activity.record(Activity {
            kind: ActivityKind::Deleted,
            file_name: base_name(&delete.rel_path),
            folder_path: local_folder.display().to_string(),
            rel_path: delete.rel_path.clone(),
            peer_name: peer_name.to_string(),
            timestamp: Utc::now(),
        });

        tracing::info!(
            "Deleted {} in {} on request of {}",
            delete.rel_path,
            local_folder.display(),
            peer_name
        );
    }

    /// React to one debounced watcher event.
    pub async fn handle_file_event(&self, event: FileEvent) {
        tracing::debug!(
            "File event: {} {} in {}",
            event.kind,
            event.rel_path,
            event.folder_path.display()
        );

        match event.kind {
            FileEventKind::Create | FileEventKind::Modify => {
                self.handle_file_change(&event).await;
            }
            // A rename is the delete half; the create half arrives as its
            // own event.
            FileEventKind::Delete | FileEventKind::Rename => {
                self.handle_file_delete(&event).await;
            }
        }
    }

    async fn handle_file_change(&self, event: &FileEvent) {
        let meta = match fsutil::file_meta(&event.path, &event.folder_path) {
            Ok(meta) => meta,
            Err(err) => {
                // The file may already be gone again.
                tracing::debug!("Failed to read {}: {}", event.path.display(), err);
                return;
            }
        };
        if meta.is_dir {
            return;
        }

        if self.consume_suppression(&event.folder_path, &event.rel_path, &meta.hash) {
            tracing::debug!(
                "Suppressing echo of just-applied write: {}",
                event.rel_path
            );
            return;
        }

        if !self.config.sync.direction.can_send() {
            tracing::debug!("Skipping send of {} (receive-only mode)", event.rel_path);
            return;
        }
        if meta.size > MAX_SYNC_FILE_SIZE {
            tracing::warn!(
                "Skipping {} ({} bytes): larger than the {} byte transfer limit",
                event.rel_path,
                meta.size,
                MAX_SYNC_FILE_SIZE
            );
            return;
        }

        self.store.put(
            &event.folder_path,
            FileRecord {
                rel_path: meta.rel_path.clone(),
                hash: meta.hash.clone(),
                size: meta.size,
                mod_time: meta.mod_time,
                permission: meta.permission,
                synced_at: Utc::now(),
                synced_from: self.config.device.name.clone(),
            },
        );

        let data = match std::fs::read(&event.path) {
            Ok(data) => data,
            Err(err) => {
                tracing::error!("Failed to read {}: {}", event.path.display(), err);
                return;
            }
        };

        let payload = FileData {
            folder_path: event.folder_path.display().to_string(),
            folder_name: folder_base_name(&event.folder_path),
            rel_path: meta.rel_path.clone(),
            size: meta.size,
            mod_time: meta.mod_time,
            permission: meta.permission,
            hash: meta.hash.clone(),
            data,
            is_chunked: false,
            chunk_index: 0,
            total_chunks: 1,
        };
        match Message::new(MessageKind::FileData, &payload) {
            Ok(message) => self.manager.broadcast(&message).await,
            Err(err) => {
                tracing::error!("Failed to encode file data: {}", err);
                return;
            }
        }

        self.activity.record(Activity {
            kind: ActivityKind::Sent,
            file_name: base_name(&event.rel_path),
            folder_path: event.folder_path.display().to_string(),
            rel_path: event.rel_path.clone(),
            peer_name: "all".to_string(),
            timestamp: Utc::now(),
        });
    }

    async fn handle_file_delete(&self, event: &FileEvent) {
        self.store.remove(&event.folder_path, &event.rel_path);
        self.just_applied
            .lock()
            .remove(&(event.folder_path.clone(), event.rel_path.clone()));

        if !self.config.sync.direction.can_send() {
            tracing::debug!(
                "Skipping delete broadcast of {} (receive-only mode)",
                event.rel_path
            );
            return;
        }

        let payload = FileDelete {
            folder_path: event.folder_path.display().to_string(),
            folder_name: folder_base_name(&event.folder_path),
            rel_path: event.rel_path.clone(),
        };
        match Message::new(MessageKind::FileDelete, &payload) {
            Ok(message) => self.manager.broadcast(&message).await,
            Err(err) => {
                tracing::error!("Failed to encode file delete: {}", err);
                return;
            }
        }

        self.activity.record(Activity {
            kind: ActivityKind::Deleted,
            file_name: base_name(&event.rel_path),
            folder_path: event.folder_path.display().to_string(),
            rel_path: event.rel_path.clone(),
            peer_name: "all".to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Check and consume the echo-suppression entry for a path.
    fn consume_suppression(&self, folder: &Path, rel_path: &str, hash: &str) -> bool {
        let mut applied = self.just_applied.lock();
        applied.retain(|_, entry| entry.applied_at.elapsed() < SUPPRESS_TTL);

        let key = (folder.to_path_buf(), rel_path.to_string());
        if applied.get(&key).is_some_and(|entry| entry.hash == hash) {
            applied.remove(&key);
            return true;
        }
        false
    }

    fn find_local_folder(&self, folder_name: &str) -> Option<PathBuf> {
        self.config
            .enabled_folders()
            .find(|f| f.base_name() == folder_name)
            .map(|f| f.path.clone())
    }

    /// Recent sync activities, newest first. `limit` 0 means all.
    pub fn activities(&self, limit: usize) -> Vec<Activity> {
        self.activity.recent(limit)
    }

    /// Currently open (unresolved) conflicts.
    pub fn open_conflicts(&self) -> Vec<Conflict> {
        self.detector.open_conflicts()
    }

    /// Resolve an open conflict by id, returning the closed conflict.
    pub fn resolve_conflict(
        &self,
        id: &str,
        resolution: Resolution,
    ) -> Result<Conflict, lansync_core::ConflictError> {
        self.detector.resolve_by_id(id, resolution)
    }

    /// The baseline store.
    pub fn store(&self) -> &StateStore {
        &self.store
    }
}

fn peer_label(session: &PeerSession) -> String {
    session
        .device_name()
        .unwrap_or_else(|| session.id().to_string())
}

fn folder_base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn base_name(rel_path: &str) -> String {
    rel_path.rsplit('/').next().unwrap_or(rel_path).to_string()
}

/// Reject relative paths that climb out of their folder.
fn has_parent_traversal(rel_path: &str) -> bool {
    rel_path.split('/').any(|component| component == "..")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traversal_detection() {
        assert!(has_parent_traversal("../etc/passwd"));
        assert!(has_parent_traversal("docs/../../escape"));
        assert!(!has_parent_traversal("docs/notes/a.txt"));
        assert!(!has_parent_traversal("dots..in..name.txt"));
    }

    #[test]
    fn base_name_extraction() {
        assert_eq!(base_name("docs/notes/a.txt"), "a.txt");
        assert_eq!(base_name("a.txt"), "a.txt");
    }

    #[test]
    fn transfer_limit_fits_the_frame_cap() {
        // base64 inflates by 4/3; the inflated payload plus JSON overhead
        // must stay under the frame cap.
        let inflated = MAX_SYNC_FILE_SIZE * 4 / 3;
        assert!(inflated + 1024 * 1024 < lansync_types::MAX_FRAME_SIZE as u64);
    }
}
