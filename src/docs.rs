use crate::api::leave_request::{ApplyLeave, LeaveDecision, LeaveFilter, LeaveListResponse};
use crate::api::notification::{MarkReadBody, NotificationListResponse, NotificationQuery};
use crate::api::task::{
    CompletionRequestBody, CreateTask, ReviewCompletionBody, SetStatusBody, TaskListResponse,
    TaskQuery, UpdateTask,
};
use crate::api::user::{UserListResponse, UserQuery};
use crate::auth::handlers::SignupReq;
use crate::model::leave_request::LeaveRequest;
use crate::model::notification::{Notification, NotificationKind};
use crate::model::task::Task;
use crate::model::user::{Gender, UserProfile};
use crate::models::{LoginReqDto, Session};
use crate::workflow::leave::LeaveStatus;
use crate::workflow::task::{
    AssigneeRecord, AssigneeStatus, CompletionRequest, Priority, Review, ReviewDecision,
    TaskStatus,
};
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Employee Management System API",
        version = "1.0.0",
        description = r#"
## Employee Management System (EMS)

Backend for a small organization's people and work tracking.

### 🔹 Key Features
- **Users**
  - Signup, login, token refresh and logout
  - Profile listing, lookup and editing
- **Tasks**
  - Assign work to one or more employees
  - Assignees request completion, the creator approves or rejects
  - Put tasks on hold and resume them
- **Leave Management**
  - Apply for leave, admin approval or rejection
- **Notifications**
  - Persisted inbox plus a server-sent events stream

### 🔐 Security
Every endpoint except signup, login, refresh and logout needs a
**JWT Bearer** access token. Admin-only operations check the
`is_super_user` flag carried in the token.

### 📦 Response Format
- JSON bodies; errors are `{"message": "..."}`
- Pagination supported for list endpoints

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::auth::handlers::signup,
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,

        crate::api::user::list_users,
        crate::api::user::list_admins,
        crate::api::user::get_user,
        crate::api::user::update_user,

        crate::api::task::create_task,
        crate::api::task::list_tasks,
        crate::api::task::assigned_to,
        crate::api::task::created_by,
        crate::api::task::get_task,
        crate::api::task::update_task,
        crate::api::task::delete_task,
        crate::api::task::request_completion,
        crate::api::task::review_completion,
        crate::api::task::set_status,

        crate::api::leave_request::apply_leave,
        crate::api::leave_request::approve_leave,
        crate::api::leave_request::get_leave,
        crate::api::leave_request::leave_data,

        crate::api::notification::list_notifications,
        crate::api::notification::unread_count,
        crate::api::notification::mark_read,
        crate::api::notification::pending_approvals,
        crate::api::notification::stream
    ),
    components(
        schemas(
            SignupReq,
            LoginReqDto,
            Session,
            UserProfile,
            Gender,
            UserQuery,
            UserListResponse,
            CreateTask,
            UpdateTask,
            CompletionRequestBody,
            ReviewCompletionBody,
            SetStatusBody,
            TaskQuery,
            TaskListResponse,
            Task,
            TaskStatus,
            AssigneeStatus,
            ReviewDecision,
            Priority,
            CompletionRequest,
            Review,
            AssigneeRecord,
            ApplyLeave,
            LeaveDecision,
            LeaveFilter,
            LeaveListResponse,
            LeaveRequest,
            LeaveStatus,
            NotificationQuery,
            NotificationListResponse,
            MarkReadBody,
            Notification,
            NotificationKind
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Users", description = "Accounts, sessions and profiles"),
        (name = "Tasks", description = "Task assignment and completion review"),
        (name = "Leave", description = "Leave management APIs"),
        (name = "Notifications", description = "Notification inbox and push stream"),
    )
)]
pub struct ApiDoc;

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}
