//! Central access-control decision point.
//!
//! Every handler and service routes its permission question through
//! [`authorize`] so the policy lives in exactly one place and can be tested
//! without a database or a request in flight.

use crate::entities::users::Role;

/// The authenticated identity making a request.
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub id: i32,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ViewTicket,
    UpdateTicket,
    DeleteTicket,
    AssignTicket,
    CloseTicket,
    AttachToTicket,
    ListAudit,
    ManageUsers,
}

/// The resource a request targets. Tickets carry their owner so ownership
/// rules can be evaluated; attachments inherit the owning ticket's rules.
#[derive(Debug, Clone, Copy)]
pub enum Resource {
    Ticket { owner_id: i32 },
    AuditTrail,
    Users,
}

/// Answer whether `actor` may perform `action` on `resource`.
///
/// Admins may do everything, including changing roles (their own included).
/// Techs may triage any ticket but never touch user administration. Plain
/// users hold owner rights over their own tickets only and can never assign
/// or force-close. Everything else is denied.
#[must_use]
pub fn authorize(actor: &Actor, action: Action, resource: &Resource) -> bool {
    if actor.role == Role::Admin {
        return true;
    }

    match (resource, action) {
        (Resource::Ticket { .. }, _) if actor.role == Role::Tech => matches!(
            action,
            Action::ViewTicket
                | Action::UpdateTicket
                | Action::DeleteTicket
                | Action::AssignTicket
                | Action::CloseTicket
                | Action::AttachToTicket
        ),
        (Resource::Ticket { owner_id }, Action::ViewTicket | Action::UpdateTicket | Action::DeleteTicket | Action::AttachToTicket) => {
            *owner_id == actor.id
        }
        (Resource::AuditTrail, Action::ListAudit) => actor.role.is_privileged(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const fn actor(id: i32, role: Role) -> Actor {
        Actor { id, role }
    }

    #[test]
    fn owner_controls_own_ticket() {
        let owner = actor(1, Role::User);
        let ticket = Resource::Ticket { owner_id: 1 };

        assert!(authorize(&owner, Action::ViewTicket, &ticket));
        assert!(authorize(&owner, Action::UpdateTicket, &ticket));
        assert!(authorize(&owner, Action::DeleteTicket, &ticket));
        assert!(authorize(&owner, Action::AttachToTicket, &ticket));
    }

    #[test]
    fn owner_cannot_triage() {
        let owner = actor(1, Role::User);
        let ticket = Resource::Ticket { owner_id: 1 };

        assert!(!authorize(&owner, Action::AssignTicket, &ticket));
        assert!(!authorize(&owner, Action::CloseTicket, &ticket));
    }

    #[test]
    fn stranger_is_denied() {
        let stranger = actor(2, Role::User);
        let ticket = Resource::Ticket { owner_id: 1 };

        assert!(!authorize(&stranger, Action::ViewTicket, &ticket));
        assert!(!authorize(&stranger, Action::UpdateTicket, &ticket));
        assert!(!authorize(&stranger, Action::DeleteTicket, &ticket));
        assert!(!authorize(&stranger, Action::AttachToTicket, &ticket));
    }

    #[test]
    fn tech_triages_any_ticket_but_not_users() {
        let tech = actor(5, Role::Tech);
        let ticket = Resource::Ticket { owner_id: 1 };

        assert!(authorize(&tech, Action::ViewTicket, &ticket));
        assert!(authorize(&tech, Action::UpdateTicket, &ticket));
        assert!(authorize(&tech, Action::AssignTicket, &ticket));
        assert!(authorize(&tech, Action::CloseTicket, &ticket));
        assert!(authorize(&tech, Action::DeleteTicket, &ticket));
        assert!(authorize(&tech, Action::ListAudit, &Resource::AuditTrail));
        assert!(!authorize(&tech, Action::ManageUsers, &Resource::Users));
    }

    #[test]
    fn admin_may_do_everything() {
        let admin = actor(9, Role::Admin);
        let ticket = Resource::Ticket { owner_id: 1 };

        assert!(authorize(&admin, Action::DeleteTicket, &ticket));
        assert!(authorize(&admin, Action::ManageUsers, &Resource::Users));
        assert!(authorize(&admin, Action::ListAudit, &Resource::AuditTrail));
    }

    #[test]
    fn user_never_sees_audit_or_user_admin() {
        let user = actor(1, Role::User);

        assert!(!authorize(&user, Action::ListAudit, &Resource::AuditTrail));
        assert!(!authorize(&user, Action::ManageUsers, &Resource::Users));
    }
}
