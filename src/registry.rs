//! 検出対象リスト
//!
//! 表示順を決める唯一のリスト。変更は `replace_all` / 単一要素の更新のみで、
//! 変更ごとに購読者へ同期的に通知する（順序保証・取りこぼしなし）。

use crate::error::{DetectError, Result};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use yolo_batch_common::{StatusTag, WorkItem};

/// 変更通知
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    /// 全置換（ビューは全再描画）
    Replaced { len: usize },
    /// 1件更新（ビューは差分適用）
    ItemChanged { index: usize, item: WorkItem },
}

#[derive(Default)]
pub struct SourceRegistry {
    items: Vec<WorkItem>,
    subscribers: Vec<Sender<RegistryEvent>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: Vec<WorkItem>) -> Self {
        Self {
            items,
            subscribers: Vec::new(),
        }
    }

    /// 変更通知を購読する
    pub fn subscribe(&mut self) -> Receiver<RegistryEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    pub fn get(&self, index: usize) -> Option<&WorkItem> {
        self.items.get(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// 全置換
    pub fn replace_all(&mut self, items: Vec<WorkItem>) {
        self.items = items;
        let len = self.items.len();
        self.notify(RegistryEvent::Replaced { len });
    }

    /// 取り込み: 末尾に追加して全置換として通知
    pub fn append_paths(&mut self, paths: impl IntoIterator<Item = PathBuf>) -> usize {
        let mut items = self.items.clone();
        let before = items.len();
        items.extend(paths.into_iter().map(WorkItem::new));
        let added = items.len() - before;
        self.replace_all(items);
        added
    }

    pub fn set_included(&mut self, index: usize, included: bool) -> Result<()> {
        let item = self.item_mut(index)?;
        item.included = included;
        let item = item.clone();
        self.notify(RegistryEvent::ItemChanged { index, item });
        Ok(())
    }

    pub fn set_status(&mut self, index: usize, status: StatusTag) -> Result<()> {
        let item = self.item_mut(index)?;
        if !item.status.can_transition_to(status) {
            return Err(DetectError::InvalidTransition {
                from: item.status,
                to: status,
            });
        }
        item.status = status;
        let item = item.clone();
        self.notify(RegistryEvent::ItemChanged { index, item });
        Ok(())
    }

    /// 明示的な再キュー（唯一 Pending へ戻せる操作）
    pub fn requeue(&mut self, index: usize) -> Result<()> {
        let item = self.item_mut(index)?;
        if item.status == StatusTag::Detecting {
            return Err(DetectError::InvalidTransition {
                from: item.status,
                to: StatusTag::Pending,
            });
        }
        item.status = StatusTag::Pending;
        let item = item.clone();
        self.notify(RegistryEvent::ItemChanged { index, item });
        Ok(())
    }

    /// 対象アイテムのみ（表示順を保持）
    pub fn filter_included(&self) -> Vec<WorkItem> {
        self.items.iter().filter(|i| i.included).cloned().collect()
    }

    /// 対象アイテムとそのインデックス
    pub fn included_entries(&self) -> Vec<(usize, WorkItem)> {
        self.items
            .iter()
            .enumerate()
            .filter(|(_, i)| i.included)
            .map(|(index, i)| (index, i.clone()))
            .collect()
    }

    pub fn count_by_status(&self, status: StatusTag) -> usize {
        self.items.iter().filter(|i| i.status == status).count()
    }

    fn item_mut(&mut self, index: usize) -> Result<&mut WorkItem> {
        let len = self.items.len();
        self.items
            .get_mut(index)
            .ok_or(DetectError::IndexOutOfRange { index, len })
    }

    fn notify(&mut self, event: RegistryEvent) {
        // 受信側が破棄された購読は取り除く
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
