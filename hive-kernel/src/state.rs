use crate::models::{UnitBoard, UnitSnapshot};
use parking_lot::Mutex;
use std::sync::Arc;

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// Dernière vue connue de chaque unit, écrite par les acteurs, lue par l'API
pub type SharedBoard = Shared<UnitBoard>;

pub fn post_snapshot(board: &SharedBoard, snapshot: UnitSnapshot) {
    board.lock().insert(snapshot.unit_id.clone(), snapshot);
}
