use crate::attributes::AttributeStore;
use crate::common::Map;
use crate::common::error::DrmsError;
use crate::common::id_counter::IdCounter;
use crate::define_id_type;

define_id_type!(TemplateId, u32);

/// Owns the attribute stores of all live job templates of a session.
///
/// Handles are allocated from a monotonic counter and are never reused, not even after
/// [`TemplateRegistry::clear`].
#[derive(Debug, Default)]
pub struct TemplateRegistry {
    counter: IdCounter,
    templates: Map<TemplateId, AttributeStore>,
}

impl TemplateRegistry {
    pub fn allocate(&mut self) -> TemplateId {
        let id = TemplateId::new(self.counter.next());
        self.templates.insert(id, AttributeStore::default());
        id
    }

    pub fn delete(&mut self, id: TemplateId) -> crate::Result<()> {
        self.templates
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| invalid_template(id))
    }

    pub fn get(&self, id: TemplateId) -> crate::Result<&AttributeStore> {
        self.templates.get(&id).ok_or_else(|| invalid_template(id))
    }

    pub fn get_mut(&mut self, id: TemplateId) -> crate::Result<&mut AttributeStore> {
        self.templates
            .get_mut(&id)
            .ok_or_else(|| invalid_template(id))
    }

    /// Copy of the current attributes, handed over to the backend on submission.
    pub fn snapshot(&self, id: TemplateId) -> crate::Result<AttributeStore> {
        self.get(id).cloned()
    }

    /// Drops all templates. The handle counter keeps its value.
    pub fn clear(&mut self) {
        self.templates.clear();
    }

    #[inline]
    pub fn contains(&self, id: TemplateId) -> bool {
        self.templates.contains_key(&id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

fn invalid_template(id: TemplateId) -> DrmsError {
    DrmsError::InvalidHandle(format!("job template {id}"))
}
