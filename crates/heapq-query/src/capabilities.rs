use heapq_snapshot::HeapSnapshot;

use crate::error::ExecError;
use crate::record::{ClassRecord, InstanceRecord};

/// The only surface a query body has onto its snapshot.
///
/// Holds nothing but the snapshot reference, so it is freely copied into
/// lazy sequence stages and may be called any number of times.
#[derive(Clone, Copy)]
pub struct HeapCapabilities<'h> {
    heap: &'h dyn HeapSnapshot,
}

impl<'h> HeapCapabilities<'h> {
    pub fn new(heap: &'h dyn HeapSnapshot) -> Self {
        Self { heap }
    }

    /// One record per live object, in snapshot order. Each call starts a new
    /// enumeration.
    pub fn all_objects(self) -> Box<dyn Iterator<Item = InstanceRecord<'h>> + 'h> {
        let heap = self.heap;
        Box::new(heap.objects().map(move |object| InstanceRecord::new(heap, object)))
    }

    /// Objects whose type name matches `name` exactly. An unknown name is
    /// simply an empty sequence.
    pub fn objects_of_type(self, name: &str) -> Box<dyn Iterator<Item = InstanceRecord<'h>> + 'h> {
        let name = name.to_string();
        Box::new(
            self.all_objects()
                .filter(move |record| record.type_of().name() == name),
        )
    }

    pub fn class_record(self, name: &str) -> Result<ClassRecord<'h>, ExecError> {
        self.heap
            .type_named(name)
            .map(|ty| ClassRecord::new(self.heap, ty))
            .ok_or_else(|| ExecError::TypeNotFound(name.to_string()))
    }

    pub fn all_classes(self) -> Box<dyn Iterator<Item = ClassRecord<'h>> + 'h> {
        let heap = self.heap;
        Box::new(heap.types().map(move |ty| ClassRecord::new(heap, ty)))
    }

    pub fn object_at(self, address: u64) -> Result<InstanceRecord<'h>, ExecError> {
        self.heap
            .object_at(address)
            .map(|object| InstanceRecord::new(self.heap, object))
            .ok_or(ExecError::InvalidObjectAddress(address))
    }
}
