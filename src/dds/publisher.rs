// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Publisher: a QoS-template grouping of data writers.
//!
//! Publishers and subscribers are not tracked in the entity index -
//! only topics, writers, and readers carry a GUID and participate in
//! discovery matching (§3's entity kinds). A publisher is a plain,
//! non-indexed factory object; its writers are the real entities and
//! are what blocks the owning participant's deletion while alive.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::qos::Qos;
use crate::dds::participant::Participant;
use crate::dds::topic::Topic;
use crate::dds::writer::DataWriter;
use crate::error::Result;

pub struct Publisher {
    pub participant: Arc<Participant>,
    qos: Mutex<Qos>,
    writers: Mutex<Vec<Arc<DataWriter>>>,
}

impl Publisher {
    pub(crate) fn new(participant: Arc<Participant>, qos: Qos) -> Arc<Self> {
        Arc::new(Self {
            participant,
            qos: Mutex::new(qos),
            writers: Mutex::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn qos(&self) -> Qos {
        self.qos.lock().clone()
    }

    pub fn create_writer(self: &Arc<Self>, topic: &Arc<Topic>, qos: Qos) -> Result<Arc<DataWriter>> {
        let writer = DataWriter::new(self.clone(), topic.clone(), qos)?;
        self.writers.lock().push(writer.clone());
        Ok(writer)
    }

    pub fn delete_writer(&self, writer: &Arc<DataWriter>) -> Result<()> {
        writer.clone().delete()?;
        self.writers.lock().retain(|w| w.guid() != writer.guid());
        Ok(())
    }

    #[must_use]
    pub fn writer_count(&self) -> usize {
        self.writers.lock().len()
    }
}
