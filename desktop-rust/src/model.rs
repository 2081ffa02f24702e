use std::collections::BTreeMap;
use std::sync::mpsc::Receiver;

use yolo_batch_common::WorkItem;
use yolo_batch_rust::playback::Frame;
use yolo_batch_rust::{Config, ConfigUpdate, FrameSink, PlayAffordance, RegistryEvent, SlotId, SourceRegistry};

/// Table rows mirrored from the registry through its change notifications.
pub struct TableRows {
    rows: Vec<WorkItem>,
    events: Receiver<RegistryEvent>,
}

impl TableRows {
    pub fn attach(registry: &mut SourceRegistry) -> Self {
        let events = registry.subscribe();
        Self {
            rows: registry.items().to_vec(),
            events,
        }
    }

    pub fn rows(&self) -> &[WorkItem] {
        &self.rows
    }

    /// Applies queued notifications. Returns true when a row changed.
    pub fn sync(&mut self, registry: &SourceRegistry) -> bool {
        let mut changed = false;
        while let Ok(event) = self.events.try_recv() {
            match event {
                RegistryEvent::Replaced { .. } => self.rows = registry.items().to_vec(),
                RegistryEvent::ItemChanged { index, item } => {
                    if let Some(row) = self.rows.get_mut(index) {
                        *row = item;
                    }
                }
            }
            changed = true;
        }
        changed
    }
}

/// Frame sink for the two viewer panes.
///
/// Frames wait in `pending` until the next repaint uploads them as textures.
pub struct ViewerSink {
    pub pending: BTreeMap<SlotId, Frame>,
    pub max: usize,
    pub cursor: usize,
    pub affordance: PlayAffordance,
}

impl Default for ViewerSink {
    fn default() -> Self {
        Self {
            pending: BTreeMap::new(),
            max: 0,
            cursor: 0,
            affordance: PlayAffordance::Play,
        }
    }
}

impl FrameSink for ViewerSink {
    fn show_frame(&mut self, slot: SlotId, frame: Frame) {
        self.pending.insert(slot, frame);
    }

    fn set_cursor_range(&mut self, max: usize) {
        self.max = max;
        self.cursor = self.cursor.min(max);
    }

    fn set_cursor(&mut self, position: usize) {
        self.cursor = position;
    }

    fn set_affordance(&mut self, affordance: PlayAffordance) {
        self.affordance = affordance;
    }
}

/// Editable copy of the settings panel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigForm {
    pub output_path: String,
    pub model_path: String,
    pub confidence: String,
    pub alert_after_complete: bool,
}

impl ConfigForm {
    pub fn from_config(config: &Config) -> Self {
        Self {
            output_path: config.output_path.display().to_string(),
            model_path: config.model_path.display().to_string(),
            confidence: config.confidence.to_string(),
            alert_after_complete: config.alert_after_complete,
        }
    }

    /// Only the fields that differ from the saved config.
    pub fn to_update(&self, saved: &Config) -> ConfigUpdate {
        let current = Self::from_config(saved);
        let mut update = ConfigUpdate::default();
        if self.output_path.trim() != current.output_path {
            update = update.output_path(self.output_path.trim());
        }
        if self.model_path.trim() != current.model_path {
            update = update.model_path(self.model_path.trim());
        }
        if self.confidence.trim() != current.confidence {
            update = update.confidence(self.confidence.trim());
        }
        if self.alert_after_complete != current.alert_after_complete {
            update = update.alert_after_complete(self.alert_after_complete);
        }
        update
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;
    use std::path::PathBuf;
    use yolo_batch_common::StatusTag;

    fn config() -> Config {
        Config {
            output_path: PathBuf::from("/work/output"),
            alert_after_complete: true,
            model_path: PathBuf::from("/work/model/yolo8n.pt"),
            confidence: 0.5,
        }
    }

    #[test]
    fn rows_follow_registry() {
        let mut registry = SourceRegistry::new();
        let mut table = TableRows::attach(&mut registry);
        assert!(!table.sync(&registry));

        registry.append_paths([PathBuf::from("a.jpg"), PathBuf::from("b.mp4")]);
        registry.set_status(1, StatusTag::Detecting).unwrap();
        assert!(table.sync(&registry));

        assert_eq!(table.rows(), registry.items());
        assert_eq!(table.rows()[1].status, StatusTag::Detecting);
    }

    #[test]
    fn sink_keeps_latest_frame_per_slot() {
        let mut sink = ViewerSink::default();
        sink.show_frame(SlotId::SOURCE, RgbaImage::new(2, 2));
        sink.show_frame(SlotId::SOURCE, RgbaImage::new(4, 4));
        sink.set_cursor(9);
        sink.set_cursor_range(5);

        assert_eq!(sink.pending.len(), 1);
        assert_eq!(sink.pending[&SlotId::SOURCE].width(), 4);
        assert_eq!(sink.cursor, 5);
    }

    #[test]
    fn untouched_form_yields_empty_update() {
        let form = ConfigForm::from_config(&config());
        assert!(form.to_update(&config()).is_empty());
    }

    #[test]
    fn edited_fields_only() {
        let mut form = ConfigForm::from_config(&config());
        form.confidence = " 0.8 ".into();
        form.alert_after_complete = false;

        let update = form.to_update(&config());
        assert_eq!(update.confidence.as_deref(), Some("0.8"));
        assert_eq!(update.alert_after_complete, Some(false));
        assert!(update.output_path.is_none());
        assert!(update.model_path.is_none());
    }
}
