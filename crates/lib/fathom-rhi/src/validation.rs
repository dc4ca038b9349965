use crate::{
    buffer::Buffer,
    frame_graph::{Scope, ScopeAttachment, ScopeAttachmentAccess, ScopeAttachmentUsage},
    image::Image,
    resource::{Resource, ResourceId},
    shader_resource_group::{
        ShaderInputBufferAccess, ShaderInputImageAccess, ShaderResourceGroup,
        ShaderResourceGroupBindingInfo,
    },
};
use fxhash::FxHashMap;
use std::fmt;

/// Chosen once at startup and injected into every validator instance.
/// Disabled validators touch no state and always pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidationMode {
    Disabled,
    Enabled,
}

impl ValidationMode {
    pub fn is_enabled(self) -> bool {
        matches!(self, ValidationMode::Enabled)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValidationDiagnostic {
    SrgQueuedForCompile {
        scope: String,
        group: String,
    },
    StaleView {
        scope: String,
        group: String,
        input: String,
        resource: String,
    },
    UsageMismatch {
        scope: String,
        group: String,
        input: String,
        resource: String,
        declared: ScopeAttachmentUsage,
    },
    AccessMismatch {
        scope: String,
        group: String,
        input: String,
        resource: String,
        declared: ScopeAttachmentAccess,
        required: ScopeAttachmentAccess,
    },
    NotAttachedToScope {
        scope: String,
        group: String,
        input: String,
        resource: String,
    },
    WriteRequiresAttachment {
        scope: String,
        group: String,
        input: String,
        resource: String,
        required: ScopeAttachmentAccess,
    },
}

impl fmt::Display for ValidationDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SrgQueuedForCompile { scope, group } => write!(
                f,
                "Scope {:?}: shader resource group {:?} is queued for compile; \
                 its pool was never registered with the frame scheduler, so GPU-side data is stale",
                scope, group
            ),
            Self::StaleView {
                scope,
                group,
                input,
                resource,
            } => write!(
                f,
                "Scope {:?}: input {:?} of {:?} holds a stale view of {:?}; \
                 the group was not recompiled after the resource was rebound",
                scope, group, input, resource
            ),
            Self::UsageMismatch {
                scope,
                group,
                input,
                resource,
                declared,
            } => write!(
                f,
                "Scope {:?}: {:?} is attached with usage {:?}, \
                 which does not permit use by shader input {:?} of {:?}",
                scope, resource, declared, input, group
            ),
            Self::AccessMismatch {
                scope,
                group,
                input,
                resource,
                declared,
                required,
            } => write!(
                f,
                "Scope {:?}: attachment of {:?} declares {:?} access, \
                 but shader input {:?} of {:?} requires {:?}",
                scope, resource, declared, input, group, required
            ),
            Self::NotAttachedToScope {
                scope,
                group,
                input,
                resource,
            } => write!(
                f,
                "Scope {:?}: {:?} is a frame attachment, but is not attached to this scope; \
                 shader input {:?} of {:?} cannot use it",
                scope, resource, input, group
            ),
            Self::WriteRequiresAttachment {
                scope,
                group,
                input,
                resource,
                required,
            } => write!(
                f,
                "Shader input {:?} of {:?} uses {:?} with {:?} access, \
                 which requires the resource to be an attachment of scope {:?}",
                input, group, resource, required, scope
            ),
        }
    }
}

fn usage_allows_shader(usage: ScopeAttachmentUsage) -> bool {
    matches!(
        usage,
        ScopeAttachmentUsage::Shader | ScopeAttachmentUsage::SubpassInput
    )
}

/// Cross-checks shader resource group bindings against the attachments the
/// active scope declared. One instance per command list; `begin_scope`
/// borrows it exclusively, so a scope must be ended before the next begins.
pub struct CommandListValidator {
    mode: ValidationMode,
}

impl CommandListValidator {
    pub fn new(mode: ValidationMode) -> Self {
        Self { mode }
    }

    /// Registers the scope's attachments in a per-resource lookup and
    /// returns the guard that performs validation for this scope.
    pub fn begin_scope<'a>(&'a mut self, scope: &'a Scope) -> ScopeValidator<'a> {
        let mut attachments_by_resource: FxHashMap<ResourceId, Vec<&'a ScopeAttachment>> =
            FxHashMap::default();

        if self.mode.is_enabled() {
            for attachment in scope.attachments() {
                attachments_by_resource
                    .entry(attachment.resource_id())
                    .or_default()
                    .push(attachment);
            }
        }

        ScopeValidator {
            mode: self.mode,
            scope,
            attachments_by_resource,
            diagnostics: Vec::new(),
        }
    }
}

/// Validation context for one scope. Only this type can validate groups, and
/// `end_scope` consumes it, so validating outside a scope cannot be
/// expressed.
pub struct ScopeValidator<'a> {
    mode: ValidationMode,
    scope: &'a Scope,
    attachments_by_resource: FxHashMap<ResourceId, Vec<&'a ScopeAttachment>>,
    diagnostics: Vec<ValidationDiagnostic>,
}

impl<'a> ScopeValidator<'a> {
    /// Checks every buffer and image input of `group` that `binding_info`
    /// marks as referenced. All mismatches are collected before returning, so
    /// a failing group reports every offending binding at once.
    pub fn validate_shader_resource_group(
        &mut self,
        group: &ShaderResourceGroup,
        binding_info: &ShaderResourceGroupBindingInfo,
    ) -> bool {
        if !self.mode.is_enabled() {
            return true;
        }

        let layout = group.layout();

        let any_referenced = layout
            .buffer_inputs
            .iter()
            .map(|input| input.name.as_str())
            .chain(layout.image_inputs.iter().map(|input| input.name.as_str()))
            .any(|name| binding_info.references(name));
        if !any_referenced {
            return true;
        }

        if group.is_queued_for_compile() {
            self.report(ValidationDiagnostic::SrgQueuedForCompile {
                scope: self.scope.name.clone(),
                group: group.name().to_owned(),
            });
            return false;
        }

        let mut valid = true;

        for (input_index, input) in layout.buffer_inputs.iter().enumerate() {
            if !binding_info.references(&input.name) {
                continue;
            }

            let required = match input.access {
                ShaderInputBufferAccess::ReadWrite => ScopeAttachmentAccess::ReadWrite,
                _ => ScopeAttachmentAccess::Read,
            };

            for view in group.buffer_views(input_index) {
                if view.desc.ignore_frame_attachment_validation {
                    continue;
                }

                let resource: &Buffer = view.buffer();
                if view.is_stale() {
                    self.report(ValidationDiagnostic::StaleView {
                        scope: self.scope.name.clone(),
                        group: group.name().to_owned(),
                        input: input.name.clone(),
                        resource: resource.tracking().name().to_owned(),
                    });
                    valid = false;
                    continue;
                }

                valid &= self.validate_resource_use(resource, group.name(), &input.name, required);
            }
        }

        for (input_index, input) in layout.image_inputs.iter().enumerate() {
            if !binding_info.references(&input.name) {
                continue;
            }

            let required = match input.access {
                ShaderInputImageAccess::ReadWrite => ScopeAttachmentAccess::ReadWrite,
                _ => ScopeAttachmentAccess::Read,
            };

            for view in group.image_views(input_index) {
                if view.desc.ignore_frame_attachment_validation {
                    continue;
                }

                let resource: &Image = view.image();
                if view.is_stale() {
                    self.report(ValidationDiagnostic::StaleView {
                        scope: self.scope.name.clone(),
                        group: group.name().to_owned(),
                        input: input.name.clone(),
                        resource: resource.tracking().name().to_owned(),
                    });
                    valid = false;
                    continue;
                }

                valid &= self.validate_resource_use(resource, group.name(), &input.name, required);
            }
        }

        valid
    }

    pub fn diagnostics(&self) -> &[ValidationDiagnostic] {
        &self.diagnostics
    }

    /// Number of distinct resources registered by `begin_scope`; stays zero
    /// when validation is disabled.
    pub fn tracked_resource_count(&self) -> usize {
        self.attachments_by_resource.len()
    }

    pub fn end_scope(self) {}

    fn validate_resource_use(
        &mut self,
        resource: &dyn AnyResource,
        group: &str,
        input: &str,
        required: ScopeAttachmentAccess,
    ) -> bool {
        let tracking = resource.any_tracking();

        if tracking.attachment().is_some() {
            self.validate_attachment(tracking.id(), tracking.name(), group, input, required)
        } else if required != ScopeAttachmentAccess::Read {
            self.report(ValidationDiagnostic::WriteRequiresAttachment {
                scope: self.scope.name.clone(),
                group: group.to_owned(),
                input: input.to_owned(),
                resource: tracking.name().to_owned(),
                required,
            });
            false
        } else {
            // Non-attachment resources are fine as long as they are only
            // read.
            true
        }
    }

    /// Succeeds if at least one of the attachments this scope declared for
    /// the resource permits shader use with exactly the required access.
    /// Otherwise every candidate's mismatch is reported.
    fn validate_attachment(
        &mut self,
        resource_id: ResourceId,
        resource: &str,
        group: &str,
        input: &str,
        required: ScopeAttachmentAccess,
    ) -> bool {
        let has_candidates = self
            .attachments_by_resource
            .get(&resource_id)
            .map_or(false, |candidates| !candidates.is_empty());

        if !has_candidates {
            self.report(ValidationDiagnostic::NotAttachedToScope {
                scope: self.scope.name.clone(),
                group: group.to_owned(),
                input: input.to_owned(),
                resource: resource.to_owned(),
            });
            return false;
        }

        let matched = self.attachments_by_resource[&resource_id]
            .iter()
            .any(|candidate| {
                usage_allows_shader(candidate.usage) && candidate.access == required
            });
        if matched {
            return true;
        }

        let mismatches: Vec<(ScopeAttachmentUsage, ScopeAttachmentAccess)> = self
            .attachments_by_resource[&resource_id]
            .iter()
            .map(|candidate| (candidate.usage, candidate.access))
            .collect();

        for (usage, access) in mismatches {
            if !usage_allows_shader(usage) {
                self.report(ValidationDiagnostic::UsageMismatch {
                    scope: self.scope.name.clone(),
                    group: group.to_owned(),
                    input: input.to_owned(),
                    resource: resource.to_owned(),
                    declared: usage,
                });
            } else {
                self.report(ValidationDiagnostic::AccessMismatch {
                    scope: self.scope.name.clone(),
                    group: group.to_owned(),
                    input: input.to_owned(),
                    resource: resource.to_owned(),
                    declared: access,
                    required,
                });
            }
        }

        false
    }

    fn report(&mut self, diagnostic: ValidationDiagnostic) {
        log::error!("{}", diagnostic);
        self.diagnostics.push(diagnostic);
    }
}

/// Object-safe view of resource bookkeeping, so buffer and image inputs run
/// through one validation path.
trait AnyResource {
    fn any_tracking(&self) -> &crate::resource::ResourceTracking;
}

impl<T: Resource> AnyResource for T {
    fn any_tracking(&self) -> &crate::resource::ResourceTracking {
        self.tracking()
    }
}
