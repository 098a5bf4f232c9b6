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

//! Resolving a parsed watch against live script memory.

use scdb_common::{scdb_debug_assert, Address, ObjectId, PropertyId, StructId};
use tracing::error;

use super::parser::{ArrayIndexNode, WatchNode};
use crate::{
    vm::{reflect, PropertyDesc, PropertyKind},
    FrameDesc, ScriptVm, StackFrame, WatchError,
};

/// Execution context a watch is evaluated in: one frame of the halted stack.
#[derive(Debug, Clone)]
pub struct WatchScope {
    /// Executing object
    pub object: ObjectId,
    /// Its class
    pub class: StructId,
    /// Base address of its fields
    pub object_base: Address,
    /// Function or state the frame executes
    pub function: StructId,
    /// Base address of the frame's parameters and locals
    pub locals: Address,
    /// Caller-provided addresses of out parameters
    pub out_params: Vec<(PropertyId, Address)>,
}

impl WatchScope {
    /// Build the scope of a shadow-stack frame, re-resolving every handle through the VM.
    ///
    /// Returns `None` when the frame or its object is gone.
    pub fn for_frame(vm: &dyn ScriptVm, frame: &StackFrame) -> Option<Self> {
        let desc = vm.frame(frame.frame())?;
        Self::from_desc(vm, &desc)
    }

    pub(crate) fn from_desc(vm: &dyn ScriptVm, desc: &FrameDesc) -> Option<Self> {
        let class = vm.object_class(desc.object)?;
        Some(Self {
            object: desc.object,
            class,
            object_base: vm.object_base(desc.object),
            function: desc.node,
            locals: desc.locals,
            out_params: desc.out_params.clone(),
        })
    }
}

/// Where a watch (or one of its segments) lives in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchValue {
    /// Property describing the value
    pub property: PropertyId,
    /// Address of the value
    pub addr: Address,
    /// Element selected by an explicit index, if any
    pub element: Option<usize>,
}

/// Cached resolution of one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ResolvedMember {
    property: PropertyId,
    addr: Address,
    // Lives in the frame's locals rather than in an object.
    local: bool,
}

/// The struct a segment is looked up in.
#[derive(Debug, Clone, Copy)]
struct Context {
    struct_id: StructId,
    base: Address,
    // Only the first segment may name a local variable.
    top: bool,
}

impl Context {
    fn top(scope: &WatchScope) -> Self {
        Self { struct_id: scope.class, base: scope.object_base, top: true }
    }
}

impl WatchNode {
    /// Resolve the whole chain from the top of `scope`
    pub fn evaluate(
        &mut self,
        vm: &dyn ScriptVm,
        scope: &WatchScope,
    ) -> Result<WatchValue, WatchError> {
        self.refresh(vm, scope, Context::top(scope))?;
        self.value(vm, scope)
    }

    /// Whether the last resolution found the first segment among the frame's locals
    pub(crate) fn is_frame_local(&self) -> bool {
        self.resolved.is_some_and(|member| member.local)
    }

    fn refresh(
        &mut self,
        vm: &dyn ScriptVm,
        scope: &WatchScope,
        cx: Context,
    ) -> Result<(), WatchError> {
        self.resolved = None;

        if cx.base.is_null() {
            let scope_name = reflect::struct_name(vm, cx.struct_id);
            error!(member = %self.name, scope = %scope_name, "Corrupted data found in watch");
            scdb_debug_assert!(!cx.base.is_null(), "null base while resolving '{}'", self.name);
            return Err(WatchError::CorruptedData { member: self.name.clone(), scope: scope_name });
        }

        let local = if cx.top { self.find_local(vm, scope) } else { None };
        let resolved = local.or_else(|| {
            let property = reflect::find_field(vm, cx.struct_id, &self.name)?;
            let offset = vm.property(property)?.offset;
            Some(ResolvedMember { property, addr: cx.base.offset(offset), local: false })
        });

        match resolved {
            Some(member) => {
                self.resolved = Some(member);
                Ok(())
            }
            None => Err(WatchError::MemberNotFound {
                member: self.name.clone(),
                scope: reflect::struct_name(vm, cx.struct_id),
            }),
        }
    }

    fn find_local(&self, vm: &dyn ScriptVm, scope: &WatchScope) -> Option<ResolvedMember> {
        if scope.locals.is_null() {
            return None;
        }
        let property = reflect::find_field(vm, scope.function, &self.name)?;
        let desc = vm.property(property)?;
        let out_addr = (desc.is_out_param && !desc.is_return_value)
            .then(|| scope.out_params.iter().find(|(p, _)| *p == property).map(|(_, a)| *a))
            .flatten();
        let addr = out_addr.unwrap_or_else(|| scope.locals.offset(desc.offset));
        Some(ResolvedMember { property, addr, local: true })
    }

    fn value(&mut self, vm: &dyn ScriptVm, scope: &WatchScope) -> Result<WatchValue, WatchError> {
        let ResolvedMember { property, addr, .. } = self.resolved.ok_or(WatchError::NoContext)?;
        let desc = vm.property(property).cloned().ok_or_else(|| WatchError::CorruptedData {
            member: self.name.clone(),
            scope: format!("{property}"),
        })?;

        let index = match &mut self.index {
            Some(node) => Some(node.evaluate(vm, scope)?),
            None => None,
        };

        if let PropertyKind::DynamicArray { inner } = desc.kind {
            return self.dynamic_array_value(vm, scope, property, addr, inner, index);
        }

        let element = match index {
            Some(i) => Some(checked_index(i, desc.array_dim, &self.name)?),
            None => None,
        };
        let addr = addr.offset(element.unwrap_or_default() * desc.element_size);

        match self.next.as_deref_mut() {
            None => Ok(WatchValue { property, addr, element }),
            Some(next) => descend(vm, scope, &desc, addr, &self.name, next),
        }
    }

    fn dynamic_array_value(
        &mut self,
        vm: &dyn ScriptVm,
        scope: &WatchScope,
        property: PropertyId,
        addr: Address,
        inner: PropertyId,
        index: Option<i64>,
    ) -> Result<WatchValue, WatchError> {
        let Some(index) = index else {
            if self.next.is_some() {
                return Err(WatchError::NotComposite(self.name.clone()));
            }
            return Ok(WatchValue { property, addr, element: None });
        };

        let array = vm.read_array(addr).ok_or_else(|| WatchError::MissingData(self.name.clone()))?;
        let element = checked_index(index, array.len, &self.name)?;
        let inner_desc = vm
            .property(inner)
            .cloned()
            .ok_or_else(|| WatchError::MissingData(self.name.clone()))?;
        let elem_addr = array.data.offset(element * inner_desc.element_size);

        match self.next.as_deref_mut() {
            None => Ok(WatchValue { property: inner, addr: elem_addr, element: Some(element) }),
            Some(next) => descend(vm, scope, &inner_desc, elem_addr, &self.name, next),
        }
    }
}

impl ArrayIndexNode {
    /// The integer this index denotes in `scope`
    pub fn evaluate(&mut self, vm: &dyn ScriptVm, scope: &WatchScope) -> Result<i64, WatchError> {
        match self {
            Self::Literal(value) => Ok(*value),
            Self::Expression(node) => {
                let value = node.evaluate(vm, scope)?;
                let text = vm
                    .export_text(value.property, value.addr)
                    .ok_or_else(|| WatchError::InvalidIndex(node.name.clone()))?;
                text.trim().parse::<i64>().map_err(|_| WatchError::InvalidIndex(text))
            }
        }
    }
}

fn checked_index(index: i64, len: usize, name: &str) -> Result<usize, WatchError> {
    usize::try_from(index).ok().filter(|i| *i < len).ok_or_else(|| {
        WatchError::IndexOutOfBounds { index, name: name.to_string(), len }
    })
}

/// Continue resolution into the members of a composite value stored at `addr`.
fn descend(
    vm: &dyn ScriptVm,
    scope: &WatchScope,
    desc: &PropertyDesc,
    addr: Address,
    name: &str,
    next: &mut WatchNode,
) -> Result<WatchValue, WatchError> {
    let cx = match &desc.kind {
        PropertyKind::Object { .. } => {
            let object = vm.read_object(addr).ok_or_else(|| WatchError::ValueIsNone(name.into()))?;
            let class =
                vm.object_class(object).ok_or_else(|| WatchError::ValueIsNone(name.into()))?;
            Context { struct_id: class, base: vm.object_base(object), top: false }
        }
        PropertyKind::Class { .. } => {
            let class = vm.read_class(addr).ok_or_else(|| WatchError::ValueIsNone(name.into()))?;
            Context { struct_id: class, base: vm.class_defaults(class), top: false }
        }
        PropertyKind::Struct { struct_id } => Context { struct_id: *struct_id, base: addr, top: false },
        PropertyKind::Scalar | PropertyKind::Delegate { .. } | PropertyKind::DynamicArray { .. } => {
            return Err(WatchError::NotComposite(name.into()));
        }
    };

    next.refresh(vm, scope, cx)?;
    next.value(vm, scope)
}
