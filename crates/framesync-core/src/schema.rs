// SPDX-License-Identifier: Apache-2.0
//! Protocol schema: classes, fields, and the dense per-partition unique IDs
//! that select adaptive distributions. Immutable once built.

use thiserror::Error;

/// Errors raised at the handful of call sites where a schema mismatch is
/// better reported than silently ignored.
///
/// Most precondition violations named in the original design (setting a
/// constant after publish, mixing a field with the wrong class at a
/// *value*-mutation call site) are kept as silent no-ops for parity with the
/// source's error model — see `Authority::set_int`/`set_ref`. This error
/// exists only for schema *construction* mistakes a builder can still make
/// even though the builder itself is linear (each step consumes and returns
/// `self`, so a class can never be extended after `ProtocolBuilder::build`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// A field handle was used against an object of a different class than
    /// the one the field was declared on.
    #[error("field belongs to a different class")]
    ForeignClass,
}

/// Which partition a class belongs to: persistent objects or one-frame
/// events. Each partition has its own dense `0..N` class numbering and its
/// own class-selection [`crate::distributions::SymbolDistribution`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassKind {
    /// A persistent, multi-frame-visible object.
    Object,
    /// A one-frame event, visible in exactly the frame it is published in.
    Event,
}

/// Identifies one class within a [`Protocol`], dense within its partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId {
    kind: ClassKind,
    index: u32,
}

impl ClassId {
    pub(crate) const fn new(kind: ClassKind, index: u32) -> Self {
        Self { kind, index }
    }

    /// Which partition (object/event) this class belongs to.
    #[must_use]
    pub const fn kind(self) -> ClassKind {
        self.kind
    }

    /// This class's index within its partition.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }
}

/// Identifies one integer field (constant or variable), carrying everything
/// needed to address and code it: the class it belongs to, whether it is
/// constant, its protocol-wide dense ID (selects the adaptive distribution),
/// and its slot index into the class's constant- or variable-state buffer
/// (each field, int or ref, occupies exactly one `i32`-sized slot).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntField {
    class: ClassId,
    is_const: bool,
    unique_id: u32,
    slot: usize,
}

impl IntField {
    /// The class this field was declared on.
    #[must_use]
    pub const fn class(self) -> ClassId {
        self.class
    }

    /// Whether this is a constant (set-once, before first publish) field.
    #[must_use]
    pub const fn is_const(self) -> bool {
        self.is_const
    }

    pub(crate) const fn unique_id(self) -> usize {
        self.unique_id as usize
    }

    pub(crate) const fn slot(self) -> usize {
        self.slot
    }
}

/// Identifies one reference field: a nullable, variable pointer to another
/// object, coded through the shared unique-ID distribution (not a field of
/// its own — see [`crate::distribs::Distribs`] for why no ref-specific
/// distribution exists).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefField {
    class: ClassId,
    slot: usize,
}

impl RefField {
    /// The class this field was declared on.
    #[must_use]
    pub const fn class(self) -> ClassId {
        self.class
    }

    pub(crate) const fn slot(self) -> usize {
        self.slot
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ClassDef {
    id: ClassId,
    const_slots: usize,
    var_slots: usize,
    const_fields: Vec<IntField>,
    var_fields: Vec<IntField>,
    var_refs: Vec<RefField>,
}

impl ClassDef {
    pub(crate) const fn id(&self) -> ClassId {
        self.id
    }

    pub(crate) const fn const_slots(&self) -> usize {
        self.const_slots
    }

    pub(crate) const fn var_slots(&self) -> usize {
        self.var_slots
    }

    pub(crate) fn const_fields(&self) -> &[IntField] {
        &self.const_fields
    }

    pub(crate) fn var_fields(&self) -> &[IntField] {
        &self.var_fields
    }

    pub(crate) fn var_refs(&self) -> &[RefField] {
        &self.var_refs
    }
}

/// An immutable protocol: the ordered object and event classes, their
/// fields, and the delta-compression horizon. Constructed once via
/// [`ProtocolBuilder`] and shared (by reference) across an authority and
/// every one of its peers.
#[derive(Debug, Clone)]
pub struct Protocol {
    max_frame_delta: u32,
    object_classes: Vec<ClassDef>,
    event_classes: Vec<ClassDef>,
    num_var_int_fields: u32,
    num_const_int_fields: u32,
}

impl Protocol {
    /// The delta-compression horizon: frames older than this relative to the
    /// current frame are never used as a baseline and are eventually retired.
    #[must_use]
    pub const fn max_frame_delta(&self) -> u32 {
        self.max_frame_delta
    }

    pub(crate) fn class(&self, id: ClassId) -> &ClassDef {
        let classes = match id.kind {
            ClassKind::Object => &self.object_classes,
            ClassKind::Event => &self.event_classes,
        };
        &classes[id.index as usize]
    }

    pub(crate) fn object_classes(&self) -> &[ClassDef] {
        &self.object_classes
    }

    pub(crate) const fn object_class_count(&self) -> usize {
        self.object_classes.len()
    }

    pub(crate) const fn event_class_count(&self) -> usize {
        self.event_classes.len()
    }

    pub(crate) const fn num_var_int_fields(&self) -> usize {
        self.num_var_int_fields as usize
    }

    pub(crate) const fn num_const_int_fields(&self) -> usize {
        self.num_const_int_fields as usize
    }
}

/// Builds a [`Protocol`] one class at a time. Every step consumes and
/// returns `self` (or a [`ClassBuilder`] that itself returns one), so a
/// finished `Protocol` can never be mutated afterwards — there is no runtime
/// "frozen" check because the type system already rules out the mistake.
#[derive(Debug, Clone)]
pub struct ProtocolBuilder {
    max_frame_delta: u32,
    object_classes: Vec<ClassDef>,
    event_classes: Vec<ClassDef>,
    num_var_int_fields: u32,
    num_const_int_fields: u32,
}

impl ProtocolBuilder {
    /// Starts a new protocol with the given delta-compression horizon.
    #[must_use]
    pub const fn new(max_frame_delta: u32) -> Self {
        Self {
            max_frame_delta,
            object_classes: Vec::new(),
            event_classes: Vec::new(),
            num_var_int_fields: 0,
            num_const_int_fields: 0,
        }
    }

    /// Starts declaring a new persistent object class.
    #[must_use]
    pub fn object_class(self) -> ClassBuilder {
        let index = self.object_classes.len() as u32;
        ClassBuilder::new(self, ClassKind::Object, index)
    }

    /// Starts declaring a new one-frame event class.
    #[must_use]
    pub fn event_class(self) -> ClassBuilder {
        let index = self.event_classes.len() as u32;
        ClassBuilder::new(self, ClassKind::Event, index)
    }

    /// Finishes the protocol.
    #[must_use]
    pub fn build(self) -> Protocol {
        Protocol {
            max_frame_delta: self.max_frame_delta,
            object_classes: self.object_classes,
            event_classes: self.event_classes,
            num_var_int_fields: self.num_var_int_fields,
            num_const_int_fields: self.num_const_int_fields,
        }
    }
}

/// Declares the fields of one class in order, then hands the protocol
/// builder back via [`ClassBuilder::build`].
#[derive(Debug, Clone)]
pub struct ClassBuilder {
    parent: ProtocolBuilder,
    id: ClassId,
    const_slots: usize,
    var_slots: usize,
    const_fields: Vec<IntField>,
    var_fields: Vec<IntField>,
    var_refs: Vec<RefField>,
}

impl ClassBuilder {
    fn new(parent: ProtocolBuilder, kind: ClassKind, index: u32) -> Self {
        Self {
            parent,
            id: ClassId { kind, index },
            const_slots: 0,
            var_slots: 0,
            const_fields: Vec::new(),
            var_fields: Vec::new(),
            var_refs: Vec::new(),
        }
    }

    /// Declares a constant integer field: set at most once, before the
    /// object's first `publish_frame`.
    pub fn const_int(&mut self) -> IntField {
        let field = IntField {
            class: self.id,
            is_const: true,
            unique_id: self.parent.num_const_int_fields,
            slot: self.const_slots,
        };
        self.parent.num_const_int_fields += 1;
        self.const_slots += 1;
        self.const_fields.push(field);
        field
    }

    /// Declares a variable integer field: may be set on any published frame.
    pub fn var_int(&mut self) -> IntField {
        let field = IntField {
            class: self.id,
            is_const: false,
            unique_id: self.parent.num_var_int_fields,
            slot: self.var_slots,
        };
        self.parent.num_var_int_fields += 1;
        self.var_slots += 1;
        self.var_fields.push(field);
        field
    }

    /// Declares a nullable variable reference to another object of this
    /// protocol.
    pub fn reference(&mut self) -> RefField {
        let field = RefField {
            class: self.id,
            slot: self.var_slots,
        };
        self.var_slots += 1;
        self.var_refs.push(field);
        field
    }

    /// Registers this class and returns the protocol builder for the next
    /// class (or [`ProtocolBuilder::build`]).
    #[must_use]
    pub fn build(self) -> ProtocolBuilder {
        let def = ClassDef {
            id: self.id,
            const_slots: self.const_slots,
            var_slots: self.var_slots,
            const_fields: self.const_fields,
            var_fields: self.var_fields,
            var_refs: self.var_refs,
        };
        let mut parent = self.parent;
        match self.id.kind {
            ClassKind::Object => parent.object_classes.push(def),
            ClassKind::Event => parent.event_classes.push(def),
        }
        parent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dense_ids_span_classes() {
        let mut builder = ProtocolBuilder::new(30).object_class();
        let a_x = builder.var_int();
        let a_y = builder.var_int();
        let parent = builder.build();
        let mut builder = parent.object_class();
        let b_x = builder.var_int();
        let parent = builder.build();
        let protocol = parent.build();

        assert_eq!(a_x.unique_id(), 0);
        assert_eq!(a_y.unique_id(), 1);
        assert_eq!(b_x.unique_id(), 2);
        assert_eq!(protocol.num_var_int_fields(), 3);
        assert_eq!(protocol.object_class_count(), 2);
    }

    #[test]
    fn const_and_var_ids_are_independent() {
        let mut builder = ProtocolBuilder::new(30).object_class();
        let c = builder.const_int();
        let v = builder.var_int();
        let protocol = builder.build().build();

        assert_eq!(c.unique_id(), 0);
        assert_eq!(v.unique_id(), 0);
        assert_eq!(protocol.num_const_int_fields(), 1);
        assert_eq!(protocol.num_var_int_fields(), 1);
    }
}
