use crate::api::clock::{ClockForm, ClockResponse, OpenEntryStatus, StatusResponse};
use crate::api::entries::{CloseSelected, EntryListResponse};
use crate::api::locations::{CreateLocation, LocationView, QrPayload, UpdateLocation};
use crate::api::reports::{
    DashboardResponse, EmployeeHours, FailedAttemptList, HoursSummaryResponse, SummaryPeriod,
    SummaryTotals, TodayStats, WeekStats,
};
use crate::api::users::{CreateUser, UpdateUser};
use crate::auth::handlers::LoginResponse;
use crate::model::{
    clock_action::ClockAction,
    failed_attempt::FailedClockAttempt,
    history::TimeEntryHistory,
    location::Location,
    role::Role,
    time_entry::{EntryBadge, EntryView, TimeEntry, TimeEntryDetail},
    user::UserPresence,
};
use crate::models::{ACCESS_COOKIE, LoginForm};
use crate::service::corrections::{EntryEdit, ManualEntry};
use crate::utils::entry_filter::{EntryStatus, Period};
use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Time Clock API",
        version = "1.0.0",
        description = r#"
## Employee Time Clock

Employees check in and out by scanning the QR code printed at their workplace.
A clock action is accepted only when the request comes from one of the
location's allowed IP addresses or CIDR ranges.

### Features
- **Clock**: check in / check out, current status
- **Reports**: dashboard, hours per employee, forgotten entries, failed attempts
- **Entries**: filtered listing, CSV and Excel export, manual corrections with history
- **Locations**: allow-list management, QR payloads and SVG codes

### Security
Login sets an HttpOnly `access_token` cookie. API clients may send the same
token as `Authorization: Bearer <token>`. Everything under `/admin` is
restricted to administrators.
"#,
    ),
    paths(
        crate::auth::handlers::login,
        crate::auth::handlers::logout,

        crate::api::clock::status,
        crate::api::clock::clock_page,
        crate::api::clock::clock_action,

        crate::api::reports::dashboard,
        crate::api::reports::hours_summary,
        crate::api::reports::forgotten_preview,
        crate::api::reports::close_forgotten,
        crate::api::reports::failed_attempts,

        crate::api::entries::list_entries,
        crate::api::entries::export_csv,
        crate::api::entries::export_xlsx,
        crate::api::entries::create_entry,
        crate::api::entries::update_entry,
        crate::api::entries::close_selected,
        crate::api::entries::entry_history,

        crate::api::locations::list_locations,
        crate::api::locations::create_location,
        crate::api::locations::update_location,
        crate::api::locations::location_qr,
        crate::api::locations::location_qr_svg,

        crate::api::users::list_users,
        crate::api::users::create_user,
        crate::api::users::update_user
    ),
    components(
        schemas(
            LoginForm,
            LoginResponse,
            ClockAction,
            ClockForm,
            ClockResponse,
            OpenEntryStatus,
            StatusResponse,
            TimeEntry,
            TimeEntryDetail,
            EntryView,
            EntryBadge,
            EntryListResponse,
            Period,
            EntryStatus,
            ManualEntry,
            EntryEdit,
            CloseSelected,
            TimeEntryHistory,
            TodayStats,
            WeekStats,
            DashboardResponse,
            SummaryPeriod,
            EmployeeHours,
            SummaryTotals,
            HoursSummaryResponse,
            FailedClockAttempt,
            FailedAttemptList,
            Location,
            LocationView,
            CreateLocation,
            UpdateLocation,
            QrPayload,
            Role,
            UserPresence,
            CreateUser,
            UpdateUser
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Login and logout"),
        (name = "Clock", description = "Employee check-in and check-out"),
        (name = "Reports", description = "Admin dashboard and reports"),
        (name = "Entries", description = "Time entry administration"),
        (name = "Locations", description = "Workplace locations and IP allow-lists"),
        (name = "Users", description = "User accounts and presence"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

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
        components.add_security_scheme(
            "cookie_auth",
            SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new(ACCESS_COOKIE))),
        );
    }
}
