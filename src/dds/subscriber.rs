// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Subscriber: a QoS-template grouping of data readers, mirroring
//! [`crate::dds::publisher::Publisher`] on the read side.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::qos::Qos;
use crate::dds::condition::GuardCondition;
use crate::dds::participant::Participant;
use crate::dds::reader::DataReader;
use crate::dds::topic::Topic;
use crate::error::Result;

pub struct Subscriber {
    pub participant: Arc<Participant>,
    qos: Mutex<Qos>,
    readers: Mutex<Vec<Arc<DataReader>>>,
    /// Fires when any contained reader's listener would have fired
    /// `data_available` but the reader itself has no listener attached
    /// (the subscriber-level `data_on_readers` fallback).
    data_on_readers: Arc<GuardCondition>,
}

impl Subscriber {
    pub(crate) fn new(participant: Arc<Participant>, qos: Qos) -> Arc<Self> {
        Arc::new(Self {
            participant,
            qos: Mutex::new(qos),
            readers: Mutex::new(Vec::new()),
            data_on_readers: GuardCondition::new(),
        })
    }

    #[must_use]
    pub fn qos(&self) -> Qos {
        self.qos.lock().clone()
    }

    #[must_use]
    pub fn data_on_readers_condition(&self) -> Arc<GuardCondition> {
        self.data_on_readers.clone()
    }

    pub fn create_reader(self: &Arc<Self>, topic: &Arc<Topic>, qos: Qos) -> Result<Arc<DataReader>> {
        let reader = DataReader::new(self.clone(), topic.clone(), qos)?;
        self.readers.lock().push(reader.clone());
        Ok(reader)
    }

    pub fn delete_reader(&self, reader: &Arc<DataReader>) -> Result<()> {
        reader.clone().delete()?;
        self.readers.lock().retain(|r| r.guid() != reader.guid());
        Ok(())
    }

    #[must_use]
    pub fn reader_count(&self) -> usize {
        self.readers.lock().len()
    }

    pub(crate) fn notify_data_on_readers(&self) {
        self.data_on_readers.set(true);
    }
}
