// SCDB - Script Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Test doubles for the two seams of the debugger core.
//!
//! - [`MockVm`]: an in-memory script VM. Every struct, class and object gets its own
//!   0x1000-byte region of a sparse address space; every field occupies 8 bytes.
//! - [`RecordingFrontEnd`]: records everything the core pushes and replays a scripted
//!   queue of events from [`DebuggerFrontEnd::poll`]. It is cheaply cloneable so a test
//!   can keep a handle after moving one into the core.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::Arc,
};

use eyre::{bail, Result};
use parking_lot::Mutex;
use scdb_common::{
    Address, FrameId, ObjectId, PropertyId, SourceLocation, StructId, WatchEntryId, WatchKind,
};

use crate::{
    DebuggerFrontEnd, FrameDesc, FrameKind, FrontEndCommand, PropertyDesc, PropertyKind, PumpEvent,
    ScriptArray, ScriptVm, StructDesc, StructKind, UserAction,
};

const REGION: u64 = 0x1000;
const SLOT: usize = 8;

/// A value stored in [`MockVm`] memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockValue {
    /// Plain exported text
    Text(String),
    /// Object reference
    Object(Option<ObjectId>),
    /// Class reference
    Class(Option<StructId>),
    /// Dynamic array header
    Array(ScriptArray),
}

#[derive(Debug, Clone)]
struct MockObject {
    class: StructId,
    name: String,
    base: Address,
    valid: bool,
}

/// In-memory [`ScriptVm`].
#[derive(Debug)]
pub struct MockVm {
    structs: Vec<StructDesc>,
    sizes: Vec<usize>,
    owners: HashMap<StructId, StructId>,
    defaults: HashMap<StructId, Address>,
    properties: Vec<PropertyDesc>,
    objects: Vec<MockObject>,
    frames: HashMap<FrameId, FrameDesc>,
    memory: HashMap<Address, MockValue>,
    next_region: u64,
    next_frame: u32,
    root_class: Option<StructId>,
    no_debug_info: HashSet<StructId>,
    /// Every value passed to [`ScriptVm::set_tick_enabled`]
    pub tick_history: Vec<bool>,
    /// Set by [`ScriptVm::request_shutdown`]
    pub shutdown_requested: bool,
}

impl Default for MockVm {
    fn default() -> Self {
        Self::new()
    }
}

impl MockVm {
    /// An empty VM whose root class is `Core.Object`
    pub fn new() -> Self {
        let mut vm = Self {
            structs: Vec::new(),
            sizes: Vec::new(),
            owners: HashMap::new(),
            defaults: HashMap::new(),
            properties: Vec::new(),
            objects: Vec::new(),
            frames: HashMap::new(),
            memory: HashMap::new(),
            next_region: 1,
            next_frame: 1,
            root_class: None,
            no_debug_info: HashSet::new(),
            tick_history: Vec::new(),
            shutdown_requested: false,
        };
        let root = vm.define_class("Object", "Core", None);
        vm.root_class = Some(root);
        vm
    }

    /// The root class
    pub fn object_class_id(&self) -> StructId {
        self.root_class.unwrap_or(StructId(0))
    }

    fn alloc(&mut self) -> Address {
        let addr = Address(self.next_region * REGION);
        self.next_region += 1;
        addr
    }

    fn define(&mut self, name: &str, kind: StructKind, super_struct: Option<StructId>) -> StructId {
        let id = StructId(self.structs.len() as u32);
        let inherited = super_struct.map(|s| self.sizes[s.0 as usize]).unwrap_or_default();
        self.structs.push(StructDesc { name: name.into(), kind, super_struct, fields: Vec::new() });
        self.sizes.push(inherited);
        id
    }

    /// Define a class; `None` as super class means "derives from the root class"
    pub fn define_class(&mut self, name: &str, package: &str, super_class: Option<StructId>) -> StructId {
        let super_class = super_class.or(self.root_class);
        let id = self.define(name, StructKind::Class { package: package.into() }, super_class);
        let defaults = self.alloc();
        self.defaults.insert(id, defaults);
        id
    }

    /// Define a script struct
    pub fn define_struct(&mut self, name: &str) -> StructId {
        self.define(name, StructKind::ScriptStruct, None)
    }

    /// Define a function owned by `class`
    pub fn define_function(&mut self, name: &str, class: StructId) -> StructId {
        let id = self.define(name, StructKind::Function, None);
        self.owners.insert(id, class);
        id
    }

    /// Define a state owned by `class`
    pub fn define_state(&mut self, name: &str, class: StructId) -> StructId {
        let id = self.define(name, StructKind::State, None);
        self.owners.insert(id, class);
        id
    }

    fn add_property(&mut self, owner: StructId, desc: PropertyDesc, listed: bool) -> PropertyId {
        let id = PropertyId(self.properties.len() as u32);
        self.properties.push(desc);
        if listed {
            self.structs[owner.0 as usize].fields.push(id);
        }
        id
    }

    fn element_size(&self, kind: &PropertyKind) -> usize {
        match kind {
            PropertyKind::Struct { struct_id } => self.sizes[struct_id.0 as usize].max(SLOT),
            _ => SLOT,
        }
    }

    /// Add a field (or function parameter/local) of `kind` to `owner`
    pub fn add_field(&mut self, owner: StructId, name: &str, type_name: &str, kind: PropertyKind) -> PropertyId {
        self.add_static_array(owner, name, type_name, kind, 1)
    }

    /// Add a fixed-size array field
    pub fn add_static_array(
        &mut self,
        owner: StructId,
        name: &str,
        type_name: &str,
        kind: PropertyKind,
        array_dim: usize,
    ) -> PropertyId {
        let element_size = self.element_size(&kind);
        let offset = self.sizes[owner.0 as usize];
        self.sizes[owner.0 as usize] += element_size * array_dim;
        let desc = PropertyDesc {
            name: name.into(),
            type_name: type_name.into(),
            kind,
            owner,
            offset,
            element_size,
            array_dim,
            is_out_param: false,
            is_return_value: false,
        };
        self.add_property(owner, desc, true)
    }

    /// Add a dynamic array field whose elements are `inner_kind`
    pub fn add_dynamic_array(
        &mut self,
        owner: StructId,
        name: &str,
        inner_type: &str,
        inner_kind: PropertyKind,
    ) -> PropertyId {
        let element_size = self.element_size(&inner_kind);
        let inner_desc = PropertyDesc {
            name: name.into(),
            type_name: inner_type.into(),
            kind: inner_kind,
            owner,
            offset: 0,
            element_size,
            array_dim: 1,
            is_out_param: false,
            is_return_value: false,
        };
        let inner = self.add_property(owner, inner_desc, false);
        self.add_field(owner, name, "Array", PropertyKind::DynamicArray { inner })
    }

    /// Add an out parameter to a function
    pub fn add_out_param(&mut self, function: StructId, name: &str, type_name: &str) -> PropertyId {
        let id = self.add_field(function, name, type_name, PropertyKind::Scalar);
        self.properties[id.0 as usize].is_out_param = true;
        id
    }

    /// Mark whether a class was compiled with debug info
    pub fn set_debug_info(&mut self, class: StructId, enabled: bool) {
        if enabled {
            self.no_debug_info.remove(&class);
        } else {
            self.no_debug_info.insert(class);
        }
    }

    /// Create a live object of `class`
    pub fn spawn(&mut self, class: StructId, name: &str) -> ObjectId {
        let base = self.alloc();
        let id = ObjectId(self.objects.len() as u32 + 1);
        self.objects.push(MockObject { class, name: name.into(), base, valid: true });
        id
    }

    /// Mark an object as pending destruction
    pub fn destroy(&mut self, object: ObjectId) {
        if let Some(obj) = self.object_mut(object) {
            obj.valid = false;
        }
    }

    fn object(&self, object: ObjectId) -> Option<&MockObject> {
        self.objects.get((object.0 as usize).checked_sub(1)?)
    }

    fn object_mut(&mut self, object: ObjectId) -> Option<&mut MockObject> {
        self.objects.get_mut((object.0 as usize).checked_sub(1)?)
    }

    /// Address of `property` inside `base`
    pub fn addr_in(&self, base: Address, property: PropertyId) -> Address {
        base.offset(self.properties[property.0 as usize].offset)
    }

    /// Address of a field of an object
    pub fn field_addr(&self, object: ObjectId, property: PropertyId) -> Address {
        self.addr_in(self.object_base(object), property)
    }

    /// Store a raw value
    pub fn poke(&mut self, addr: Address, value: MockValue) {
        self.memory.insert(addr, value);
    }

    /// Store exported text at `addr`
    pub fn set_text(&mut self, addr: Address, text: &str) {
        self.poke(addr, MockValue::Text(text.into()));
    }

    /// Store text into a field of an object
    pub fn set_field(&mut self, object: ObjectId, property: PropertyId, text: &str) {
        let addr = self.field_addr(object, property);
        self.set_text(addr, text);
    }

    /// Store an object reference into a field of an object
    pub fn set_object_field(&mut self, object: ObjectId, property: PropertyId, value: Option<ObjectId>) {
        let addr = self.field_addr(object, property);
        self.poke(addr, MockValue::Object(value));
    }

    /// Store a class reference at `addr`
    pub fn set_class_ref(&mut self, addr: Address, value: Option<StructId>) {
        self.poke(addr, MockValue::Class(value));
    }

    /// Allocate `len` elements for the dynamic array at `addr`, returning the data address
    pub fn set_array(&mut self, addr: Address, len: usize) -> Address {
        let data = self.alloc();
        self.poke(addr, MockValue::Array(ScriptArray { data, len }));
        data
    }

    /// Push a VM frame for `object` executing `node`
    pub fn enter(&mut self, object: ObjectId, node: StructId) -> FrameId {
        let kind = match self.structs.get(node.0 as usize).map(|s| &s.kind) {
            Some(StructKind::State) => FrameKind::State,
            Some(StructKind::Class { .. }) => FrameKind::ClassScope,
            _ => FrameKind::Function,
        };
        let owner_class = self
            .owners
            .get(&node)
            .copied()
            .or_else(|| self.object(object).map(|o| o.class))
            .unwrap_or(StructId(0));
        let locals = if kind == FrameKind::Function { self.alloc() } else { Address::NULL };

        let id = FrameId(self.next_frame);
        self.next_frame += 1;
        self.frames.insert(
            id,
            FrameDesc {
                object,
                node,
                kind,
                owner_class,
                locals,
                out_params: Vec::new(),
                latent_pending: false,
            },
        );
        id
    }

    /// Mutable access to a frame record
    pub fn frame_mut(&mut self, frame: FrameId) -> Option<&mut FrameDesc> {
        self.frames.get_mut(&frame)
    }

    /// Address of a local of a function frame
    pub fn local_addr(&self, frame: FrameId, property: PropertyId) -> Address {
        let locals = self.frames.get(&frame).map(|f| f.locals).unwrap_or(Address::NULL);
        self.addr_in(locals, property)
    }

    /// Drop a frame record
    pub fn leave(&mut self, frame: FrameId) {
        self.frames.remove(&frame);
    }
}

impl ScriptVm for MockVm {
    fn frame(&self, frame: FrameId) -> Option<FrameDesc> {
        self.frames.get(&frame).cloned()
    }

    fn struct_desc(&self, id: StructId) -> Option<&StructDesc> {
        self.structs.get(id.0 as usize)
    }

    fn property(&self, id: PropertyId) -> Option<&PropertyDesc> {
        self.properties.get(id.0 as usize)
    }

    fn root_class(&self) -> Option<StructId> {
        self.root_class
    }

    fn object_class(&self, object: ObjectId) -> Option<StructId> {
        self.object(object).map(|o| o.class)
    }

    fn object_name(&self, object: ObjectId) -> String {
        self.object(object).map(|o| o.name.clone()).unwrap_or_else(|| "None".into())
    }

    fn object_base(&self, object: ObjectId) -> Address {
        self.object(object).map(|o| o.base).unwrap_or(Address::NULL)
    }

    fn is_object_valid(&self, object: ObjectId) -> bool {
        self.object(object).is_some_and(|o| o.valid)
    }

    fn class_defaults(&self, class: StructId) -> Address {
        self.defaults.get(&class).copied().unwrap_or(Address::NULL)
    }

    fn has_debug_info(&self, class: StructId) -> bool {
        !self.no_debug_info.contains(&class)
    }

    fn read_object(&self, addr: Address) -> Option<ObjectId> {
        match self.memory.get(&addr) {
            Some(MockValue::Object(object)) => *object,
            _ => None,
        }
    }

    fn read_class(&self, addr: Address) -> Option<StructId> {
        match self.memory.get(&addr) {
            Some(MockValue::Class(class)) => *class,
            _ => None,
        }
    }

    fn read_array(&self, addr: Address) -> Option<ScriptArray> {
        match self.memory.get(&addr) {
            Some(MockValue::Array(array)) => Some(*array),
            _ => Some(ScriptArray { data: Address::NULL, len: 0 }),
        }
    }

    fn export_text(&self, _property: PropertyId, addr: Address) -> Option<String> {
        match self.memory.get(&addr)? {
            MockValue::Text(text) => Some(text.clone()),
            MockValue::Object(Some(object)) => Some(self.object_name(*object)),
            MockValue::Object(None) | MockValue::Class(None) => Some("None".into()),
            MockValue::Class(Some(class)) => self.struct_desc(*class).map(|s| s.name.clone()),
            MockValue::Array(array) => Some(array.len.to_string()),
        }
    }

    fn import_text(&mut self, property: PropertyId, addr: Address, text: &str) -> Result<()> {
        let Some(desc) = self.property(property) else {
            bail!("unknown property {property}");
        };
        if desc.kind != PropertyKind::Scalar {
            bail!("cannot import text into {} '{}'", desc.type_name, desc.name);
        }
        self.set_text(addr, text);
        Ok(())
    }

    fn set_tick_enabled(&mut self, enabled: bool) {
        self.tick_history.push(enabled);
    }

    fn request_shutdown(&mut self) {
        self.shutdown_requested = true;
    }

    fn is_shutting_down(&self) -> bool {
        self.shutdown_requested
    }
}

/// One entry added to a watch pane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEntry {
    /// Id handed back to the core
    pub id: WatchEntryId,
    /// Parent entry
    pub parent: Option<WatchEntryId>,
    /// Displayed name
    pub name: String,
    /// Displayed value
    pub value: String,
}

#[derive(Debug, Default)]
struct Recording {
    locations: Vec<SourceLocation>,
    call_stacks: Vec<Vec<String>>,
    panes: HashMap<WatchKind, Vec<RecordedEntry>>,
    open_batches: HashSet<WatchKind>,
    log: Vec<String>,
    script: VecDeque<PumpEvent>,
    halts: usize,
    polls: usize,
    connected: bool,
    closes: usize,
    next_id: usize,
}

/// A [`DebuggerFrontEnd`] that records outbound calls and replays scripted input.
///
/// When the script runs dry, [`DebuggerFrontEnd::poll`] answers `Go`.
#[derive(Debug, Clone, Default)]
pub struct RecordingFrontEnd {
    inner: Arc<Mutex<Recording>>,
}

impl RecordingFrontEnd {
    /// A connected front end with an empty script
    pub fn new() -> Self {
        let front_end = Self::default();
        front_end.inner.lock().connected = true;
        front_end
    }

    /// Queue an event for `poll`
    pub fn push_event(&self, event: PumpEvent) {
        self.inner.lock().script.push_back(event);
    }

    /// Queue a command for `poll`
    pub fn push_command(&self, command: FrontEndCommand) {
        self.push_event(PumpEvent::Command(command));
    }

    /// Queue a run-control action for `poll`
    pub fn push_action(&self, action: UserAction) {
        self.push_command(FrontEndCommand::Action { action });
    }

    /// Number of halts (calls to `show`)
    pub fn halts(&self) -> usize {
        self.inner.lock().halts
    }

    /// Number of polls
    pub fn polls(&self) -> usize {
        self.inner.lock().polls
    }

    /// Every reported location, oldest first
    pub fn locations(&self) -> Vec<SourceLocation> {
        self.inner.lock().locations.clone()
    }

    /// The last reported location
    pub fn last_location(&self) -> Option<SourceLocation> {
        self.inner.lock().locations.last().cloned()
    }

    /// The last reported call stack
    pub fn last_call_stack(&self) -> Option<Vec<String>> {
        self.inner.lock().call_stacks.last().cloned()
    }

    /// Entries currently in a pane
    pub fn entries(&self, kind: WatchKind) -> Vec<RecordedEntry> {
        self.inner.lock().panes.get(&kind).cloned().unwrap_or_default()
    }

    /// Names of the entries currently in a pane
    pub fn names(&self, kind: WatchKind) -> Vec<String> {
        self.entries(kind).into_iter().map(|e| e.name).collect()
    }

    /// First entry of a pane whose name starts with `prefix`
    pub fn find(&self, kind: WatchKind, prefix: &str) -> Option<RecordedEntry> {
        self.entries(kind).into_iter().find(|e| e.name.starts_with(prefix))
    }

    /// Direct children of an entry
    pub fn children(&self, kind: WatchKind, parent: WatchEntryId) -> Vec<RecordedEntry> {
        self.entries(kind).into_iter().filter(|e| e.parent == Some(parent)).collect()
    }

    /// Captured log lines
    pub fn log(&self) -> Vec<String> {
        self.inner.lock().log.clone()
    }

    /// Number of `close` calls
    pub fn closes(&self) -> usize {
        self.inner.lock().closes
    }
}

impl DebuggerFrontEnd for RecordingFrontEnd {
    fn notify_location(&mut self, location: &SourceLocation) {
        self.inner.lock().locations.push(location.clone());
    }

    fn update_call_stack(&mut self, frames: &[String]) {
        self.inner.lock().call_stacks.push(frames.to_vec());
    }

    fn begin_watch_batch(&mut self, kind: WatchKind) {
        self.inner.lock().open_batches.insert(kind);
    }

    fn clear_watch(&mut self, kind: WatchKind) {
        self.inner.lock().panes.remove(&kind);
    }

    fn add_watch_entry(
        &mut self,
        kind: WatchKind,
        parent: Option<WatchEntryId>,
        name: &str,
        value: &str,
    ) -> WatchEntryId {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = WatchEntryId(inner.next_id);
        let entry = RecordedEntry { id, parent, name: name.into(), value: value.into() };
        inner.panes.entry(kind).or_default().push(entry);
        id
    }

    fn end_watch_batch(&mut self, kind: WatchKind) {
        self.inner.lock().open_batches.remove(&kind);
    }

    fn append_log(&mut self, line: &str) {
        self.inner.lock().log.push(line.into());
    }

    fn show(&mut self) {
        self.inner.lock().halts += 1;
    }

    fn poll(&mut self) -> PumpEvent {
        let mut inner = self.inner.lock();
        inner.polls += 1;
        inner
            .script
            .pop_front()
            .unwrap_or(PumpEvent::Command(FrontEndCommand::Action { action: UserAction::Go }))
    }

    fn is_connected(&self) -> bool {
        self.inner.lock().connected
    }

    fn connect(&mut self) {
        self.inner.lock().connected = true;
    }

    fn close(&mut self) {
        let mut inner = self.inner.lock();
        inner.connected = false;
        inner.closes += 1;
    }
}
