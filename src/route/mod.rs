use rocket::{Build, Rocket};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod admin;
pub mod courses;
pub mod enrollments;
pub mod projects;
pub mod social;
pub mod users;

use crate::data::course as cd;
use crate::data::enrollment as ed;
use crate::data::project as pd;
use crate::data::user as ud;
use crate::resp::envelope::PageMeta;
use crate::role::Role;

#[derive(OpenApi)]
#[openapi(
    paths(
        users::register,
        users::login,
        users::refresh_token,
        users::logout,
        users::list,
        users::get,
        users::update,
        users::delete,
        admin::login,
        admin::list_users,
        admin::create_user,
        admin::update_user,
        admin::delete_user,
        admin::list_enrollments,
        admin::delete_enrollment,
        admin::stats,
        courses::list,
        courses::get,
        courses::create,
        courses::update,
        courses::delete,
        courses::students,
        enrollments::enroll,
        enrollments::unenroll,
        enrollments::mine,
        enrollments::update,
        projects::create,
        projects::mine,
        projects::get,
        projects::update,
        projects::delete,
        projects::by_username,
        projects::by_tag,
        projects::search,
        projects::add_member,
        projects::remove_member,
        projects::update_member_role,
        social::like,
        social::unlike,
        social::save,
        social::unsave,
        social::liked,
        social::saved,
        social::add_comment,
        social::delete_comment,
        social::comments,
    ),
    components(schemas(
        Role,
        PageMeta,
        ud::Gender,
        ud::UserResponse,
        ud::UserSummary,
        ud::db::UserSignupData,
        ud::db::UserLoginData,
        ud::db::UserUpdateData,
        users::SessionResponse,
        admin::AdminCreateUserData,
        admin::PlatformStats,
        cd::CourseLevel,
        cd::CourseCreateData,
        cd::CourseUpdateData,
        cd::CourseResponse,
        cd::CourseSummary,
        ed::EnrollRole,
        ed::EnrollmentStatus,
        ed::EnrollmentUpdateData,
        ed::EnrollmentResponse,
        pd::ProjectStatus,
        pd::ProjectStats,
        pd::ProjectMember,
        pd::ProjectMemberData,
        pd::ProjectCreateData,
        pd::ProjectUpdateData,
        pd::ProjectResponse,
        pd::ProjectMemberResponse,
        pd::CommentCreateData,
        pd::CommentNode,
        projects::MemberRoleData,
    ))
)]
pub struct ApiDoc;

pub fn mount_api(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket
        .mount(
            "/api/users",
            routes![
                users::register,
                users::login,
                users::refresh_token,
                users::logout,
                users::list,
                users::get,
                users::update,
                users::delete,
            ],
        )
        .mount(
            "/api/admin",
            routes![
                admin::login,
                admin::refresh_token,
                admin::logout,
                admin::list_users,
                admin::create_user,
                admin::update_user,
                admin::delete_user,
                admin::list_enrollments,
                admin::delete_enrollment,
                admin::stats,
            ],
        )
        .mount(
            "/api/courses",
            routes![
                courses::list,
                courses::get,
                courses::create,
                courses::update,
                courses::delete,
                courses::students,
            ],
        )
        .mount(
            "/api",
            routes![
                enrollments::enroll,
                enrollments::unenroll,
                enrollments::mine,
                enrollments::update,
            ],
        )
        .mount(
            "/api/projects",
            routes![
                projects::create,
                projects::mine,
                projects::get,
                projects::update,
                projects::delete,
                projects::by_username,
                projects::by_tag,
                projects::search,
                projects::add_member,
                projects::remove_member,
                projects::update_member_role,
            ],
        )
        .mount(
            "/api",
            routes![
                social::like,
                social::unlike,
                social::save,
                social::unsave,
                social::liked,
                social::saved,
                social::add_comment,
                social::delete_comment,
                social::comments,
            ],
        )
        .mount(
            "/",
            SwaggerUi::new("/swagger/<_..>").url("/api/openapi.json", ApiDoc::openapi()),
        )
}
