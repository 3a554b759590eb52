use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::super::domain::CallCenterId;

/// One mutex per call center, held across agent selection and the rotation bookkeeping write.
#[derive(Debug, Default)]
pub(crate) struct CallCenterLocks {
    handles: Mutex<HashMap<CallCenterId, Arc<Mutex<()>>>>,
}

impl CallCenterLocks {
    pub(crate) fn handle(&self, call_center: &CallCenterId) -> Arc<Mutex<()>> {
        let mut handles = match self.handles.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        handles
            .entry(call_center.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
