//! Timed operations and the events hooked to them
//!
//! An [`Action`] is an interval `[start, end]` carrying one [`ActionKind`]
//! and two ordered lists of [`Event`]s, applied right before (`Hook::Pre`)
//! and right after (`Hook::Post`) the action itself.

use crate::error::{ActionError, PreconditionError};
use reconf_model::{Model, NodeId, VmId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A moment in a plan
pub type Instant = u32;

/// Moment an event is considered with regards to its action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Hook {
    /// Before the action starts
    Pre,
    /// After the action ends
    Post,
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pre => write!(f, "pre"),
            Self::Post => write!(f, "post"),
        }
    }
}

/// Turn on an offline node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BootNode {
    /// The node to boot
    pub node: NodeId,
}

/// Turn off an online, empty node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShutdownNode {
    /// The node to turn off
    pub node: NodeId,
}

/// Start a ready VM on a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BootVm {
    /// The VM to start
    pub vm: VmId,
    /// Its destination
    pub dst: NodeId,
}

/// Stop a running VM, making it ready
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShutdownVm {
    /// The VM to stop
    pub vm: VmId,
    /// Its current host
    pub host: NodeId,
}

/// Suspend a running VM, storing its image on a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SuspendVm {
    /// The VM to suspend
    pub vm: VmId,
    /// Its current host
    pub src: NodeId,
    /// The node storing the image
    pub dst: NodeId,
}

/// Resume a sleeping VM on a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResumeVm {
    /// The VM to resume
    pub vm: VmId,
    /// The node storing the image
    pub src: NodeId,
    /// The node that will run the VM
    pub dst: NodeId,
}

/// Live-migrate a running VM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MigrateVm {
    /// The VM to move
    pub vm: VmId,
    /// Its current host
    pub src: NodeId,
    /// Its destination
    pub dst: NodeId,
}

/// Destroy a VM in any state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KillVm {
    /// The VM to destroy
    pub vm: VmId,
    /// Its host, `None` for a ready VM
    pub host: Option<NodeId>,
}

/// Declare a new VM in the ready state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForgeVm {
    /// The VM to create
    pub vm: VmId,
}

/// Change the amount of a resource allocated to a running VM
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Allocate {
    /// The VM
    pub vm: VmId,
    /// Its host
    pub host: NodeId,
    /// Resource identifier
    pub resource: String,
    /// New amount
    pub amount: u32,
}

macro_rules! impl_ctor {
    ($ty:ident { $($field:ident : $fty:ty),* }) => {
        impl $ty {
            #[doc = concat!("Create a `", stringify!($ty), "` payload")]
            #[inline]
            #[must_use]
            pub fn new($($field: $fty),*) -> Self {
                Self { $($field),* }
            }
        }
    };
}

impl_ctor!(BootNode { node: NodeId });
impl_ctor!(ShutdownNode { node: NodeId });
impl_ctor!(BootVm { vm: VmId, dst: NodeId });
impl_ctor!(ShutdownVm { vm: VmId, host: NodeId });
impl_ctor!(SuspendVm { vm: VmId, src: NodeId, dst: NodeId });
impl_ctor!(ResumeVm { vm: VmId, src: NodeId, dst: NodeId });
impl_ctor!(MigrateVm { vm: VmId, src: NodeId, dst: NodeId });
impl_ctor!(KillVm { vm: VmId, host: Option<NodeId> });
impl_ctor!(ForgeVm { vm: VmId });

impl Allocate {
    /// Create an `Allocate` payload
    #[must_use]
    pub fn new(vm: VmId, host: NodeId, resource: impl Into<String>, amount: u32) -> Self {
        Self {
            vm,
            host,
            resource: resource.into(),
            amount,
        }
    }
}

/// Every kind of operation a plan may contain
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    /// See [`BootNode`]
    BootNode(BootNode),
    /// See [`ShutdownNode`]
    ShutdownNode(ShutdownNode),
    /// See [`BootVm`]
    BootVm(BootVm),
    /// See [`ShutdownVm`]
    ShutdownVm(ShutdownVm),
    /// See [`SuspendVm`]
    SuspendVm(SuspendVm),
    /// See [`ResumeVm`]
    ResumeVm(ResumeVm),
    /// See [`MigrateVm`]
    MigrateVm(MigrateVm),
    /// See [`KillVm`]
    KillVm(KillVm),
    /// See [`ForgeVm`]
    ForgeVm(ForgeVm),
    /// See [`Allocate`]
    Allocate(Allocate),
}

macro_rules! impl_from_payload {
    ($($ty:ident),*) => {
        $(
            impl From<$ty> for ActionKind {
                fn from(value: $ty) -> Self {
                    ActionKind::$ty(value)
                }
            }
        )*
    };
}

impl_from_payload!(
    BootNode,
    ShutdownNode,
    BootVm,
    ShutdownVm,
    SuspendVm,
    ResumeVm,
    MigrateVm,
    KillVm,
    ForgeVm,
    Allocate
);

impl ActionKind {
    /// Short name of the kind
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::BootNode(_) => "bootNode",
            Self::ShutdownNode(_) => "shutdownNode",
            Self::BootVm(_) => "bootVM",
            Self::ShutdownVm(_) => "shutdownVM",
            Self::SuspendVm(_) => "suspendVM",
            Self::ResumeVm(_) => "resumeVM",
            Self::MigrateVm(_) => "migrate",
            Self::KillVm(_) => "killVM",
            Self::ForgeVm(_) => "forgeVM",
            Self::Allocate(_) => "allocate",
        }
    }

    /// Apply the effect of the kind alone
    ///
    /// # Errors
    /// Returns the first violated precondition; the model is left untouched
    /// in that case.
    pub fn apply(&self, mo: &mut Model) -> Result<(), PreconditionError> {
        match self {
            Self::BootNode(a) => {
                if !mo.mapping().is_offline(a.node) {
                    return Err(PreconditionError::NodeNotOffline(a.node));
                }
                mo.mapping_mut().add_online_node(a.node);
            }
            Self::ShutdownNode(a) => {
                if !mo.mapping().is_online(a.node) {
                    return Err(PreconditionError::NodeNotOnline(a.node));
                }
                mo.mapping_mut().add_offline_node(a.node)?;
            }
            Self::BootVm(a) => {
                if !mo.mapping().is_ready(a.vm) {
                    return Err(PreconditionError::VmNotReady(a.vm));
                }
                mo.mapping_mut().add_running_vm(a.vm, a.dst)?;
            }
            Self::ShutdownVm(a) => {
                ensure_running_on(mo, a.vm, a.host)?;
                mo.mapping_mut().add_ready_vm(a.vm);
            }
            Self::SuspendVm(a) => {
                ensure_running_on(mo, a.vm, a.src)?;
                mo.mapping_mut().add_sleeping_vm(a.vm, a.dst)?;
            }
            Self::ResumeVm(a) => {
                if !mo.mapping().sleeping_vms(a.src).contains(&a.vm) {
                    return Err(PreconditionError::VmNotSleepingOn {
                        vm: a.vm,
                        node: a.src,
                    });
                }
                mo.mapping_mut().add_running_vm(a.vm, a.dst)?;
            }
            Self::MigrateVm(a) => {
                ensure_running_on(mo, a.vm, a.src)?;
                mo.mapping_mut().add_running_vm(a.vm, a.dst)?;
            }
            Self::KillVm(a) => {
                let state = mo
                    .mapping()
                    .vm_state(a.vm)
                    .ok_or(PreconditionError::UnknownVm(a.vm))?;
                if state.host() != a.host {
                    return Err(PreconditionError::VmNotHostedBy {
                        vm: a.vm,
                        node: a.host,
                    });
                }
                mo.mapping_mut().remove_vm(a.vm);
                mo.forget_vm(a.vm);
            }
            Self::ForgeVm(a) => {
                if mo.mapping().contains_vm(a.vm) {
                    return Err(PreconditionError::VmAlreadyExists(a.vm));
                }
                mo.mapping_mut().add_ready_vm(a.vm);
            }
            Self::Allocate(a) => {
                ensure_running_on(mo, a.vm, a.host)?;
                set_consumption(mo, a.vm, &a.resource, a.amount)?;
            }
        }
        Ok(())
    }
}

fn ensure_running_on(mo: &Model, vm: VmId, node: NodeId) -> Result<(), PreconditionError> {
    if mo.mapping().running_vms(node).contains(&vm) {
        Ok(())
    } else {
        Err(PreconditionError::VmNotRunningOn { vm, node })
    }
}

fn set_consumption(
    mo: &mut Model,
    vm: VmId,
    resource: &str,
    amount: u32,
) -> Result<(), PreconditionError> {
    let rc = mo
        .resource_mut(resource)
        .ok_or_else(|| PreconditionError::UnknownResource(resource.to_string()))?;
    rc.set_consumption(vm, amount);
    Ok(())
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name();
        match self {
            Self::BootNode(a) => write!(f, "{name}(node={})", a.node),
            Self::ShutdownNode(a) => write!(f, "{name}(node={})", a.node),
            Self::BootVm(a) => write!(f, "{name}(vm={}, on={})", a.vm, a.dst),
            Self::ShutdownVm(a) => write!(f, "{name}(vm={}, on={})", a.vm, a.host),
            Self::SuspendVm(a) => write!(f, "{name}(vm={}, from={}, to={})", a.vm, a.src, a.dst),
            Self::ResumeVm(a) => write!(f, "{name}(vm={}, from={}, to={})", a.vm, a.src, a.dst),
            Self::MigrateVm(a) => write!(f, "{name}(vm={}, from={}, to={})", a.vm, a.src, a.dst),
            Self::KillVm(KillVm { vm, host: Some(n) }) => write!(f, "{name}(vm={vm}, on={n})"),
            Self::KillVm(KillVm { vm, host: None }) => write!(f, "{name}(vm={vm})"),
            Self::ForgeVm(a) => write!(f, "{name}(vm={})", a.vm),
            Self::Allocate(a) => write!(
                f,
                "{name}(vm={}, on={}, rc={}, amount={})",
                a.vm, a.host, a.resource, a.amount
            ),
        }
    }
}

/// Instantaneous change attached to an action
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Event {
    /// Set the amount of a resource allocated to a VM
    Allocate {
        /// The VM
        vm: VmId,
        /// Resource identifier
        resource: String,
        /// New amount
        amount: u32,
    },
    /// Rename a VM everywhere in the model
    SubstituteVm {
        /// Old identifier
        vm: VmId,
        /// New identifier
        new_vm: VmId,
    },
}

impl Event {
    /// Apply the event
    ///
    /// # Errors
    /// Returns the violated precondition.
    pub fn apply(&self, mo: &mut Model) -> Result<(), PreconditionError> {
        match self {
            Self::Allocate {
                vm,
                resource,
                amount,
            } => set_consumption(mo, *vm, resource, *amount),
            Self::SubstituteVm { vm, new_vm } => {
                mo.mapping_mut().substitute_vm(*vm, *new_vm)?;
                mo.substitute_vm_in_resources(*vm, *new_vm);
                Ok(())
            }
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allocate {
                vm,
                resource,
                amount,
            } => write!(f, "allocate(vm={vm}, rc={resource}, amount={amount})"),
            Self::SubstituteVm { vm, new_vm } => write!(f, "substitute(vm={vm}, by={new_vm})"),
        }
    }
}

/// A timed operation of a reconfiguration plan
///
/// Two actions are equal when their interval, kind and hooked events are
/// equal; a plan keeps a single instance of each.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Action {
    start: Instant,
    end: Instant,
    kind: ActionKind,
    pre: Vec<Event>,
    post: Vec<Event>,
}

impl Action {
    /// Create an action over `[start, end]`
    ///
    /// # Errors
    /// - `ActionError::InvalidInterval` if `end < start`
    pub fn new(kind: impl Into<ActionKind>, start: Instant, end: Instant) -> Result<Self, ActionError> {
        if end < start {
            return Err(ActionError::InvalidInterval { start, end });
        }
        Ok(Self {
            start,
            end,
            kind: kind.into(),
            pre: Vec::new(),
            post: Vec::new(),
        })
    }

    /// Create an action over `[start, start + duration]`
    #[must_use]
    pub fn with_duration(kind: impl Into<ActionKind>, start: Instant, duration: u32) -> Self {
        Self {
            start,
            end: start.saturating_add(duration),
            kind: kind.into(),
            pre: Vec::new(),
            post: Vec::new(),
        }
    }

    /// Moment the action starts
    #[inline]
    #[must_use]
    pub fn start(&self) -> Instant {
        self.start
    }

    /// Moment the action ends
    #[inline]
    #[must_use]
    pub fn end(&self) -> Instant {
        self.end
    }

    /// The operation performed
    #[inline]
    #[must_use]
    pub fn kind(&self) -> &ActionKind {
        &self.kind
    }

    /// Whether both actions share the same interval
    #[must_use]
    pub fn is_simultaneous(&self, other: &Action) -> bool {
        self.start == other.start && self.end == other.end
    }

    /// Attach an event. Returns `false` if it was already attached to that hook
    pub fn add_event(&mut self, hook: Hook, event: Event) -> bool {
        let events = match hook {
            Hook::Pre => &mut self.pre,
            Hook::Post => &mut self.post,
        };
        if events.contains(&event) {
            return false;
        }
        events.push(event);
        true
    }

    /// Attach an event, builder style
    #[must_use]
    pub fn with_event(mut self, hook: Hook, event: Event) -> Self {
        self.add_event(hook, event);
        self
    }

    /// Events attached to a hook, in attachment order
    #[must_use]
    pub fn events(&self, hook: Hook) -> &[Event] {
        match hook {
            Hook::Pre => &self.pre,
            Hook::Post => &self.post,
        }
    }

    /// Apply the `Pre` events, the action, then the `Post` events
    ///
    /// # Errors
    /// Returns the first violated precondition. Effects applied before the
    /// failure are kept.
    pub fn apply(&self, mo: &mut Model) -> Result<(), PreconditionError> {
        self.apply_events(Hook::Pre, mo)?;
        self.kind.apply(mo)?;
        self.apply_events(Hook::Post, mo)
    }

    /// Apply the events attached to one hook
    ///
    /// # Errors
    /// Returns the first violated precondition.
    pub fn apply_events(&self, hook: Hook, mo: &mut Model) -> Result<(), PreconditionError> {
        self.events(hook).iter().try_for_each(|e| e.apply(mo))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        for hook in [Hook::Pre, Hook::Post] {
            let events = self.events(hook);
            if events.is_empty() {
                continue;
            }
            write!(f, " @{hook}={{")?;
            for (i, e) in events.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{e}")?;
            }
            write!(f, "}}")?;
        }
        Ok(())
    }
}
