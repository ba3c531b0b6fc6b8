use crate::models::directory::{
    DepartmentInput, DepartmentRecord, EmployeeCreateInput, EmployeeRecord, EmployeeUpdateInput,
    RoleInput, RoleRecord,
};
use crate::models::performance::{
    AssessmentCreateInput, AssessmentUpdateInput, CoefficientResolution,
    PerformanceAssessmentRecord,
};
use crate::models::project::{
    MemberCreateInput, MemberUpdateInput, ProjectCreateInput, ProjectMemberRecord, ProjectRecord,
    ProjectUpdateInput,
};
use crate::models::settings::{AllocationSettings, AllocationSettingsUpdate};

use super::{run_blocking, ApiResponse, AppState, CommandResult};

pub async fn employee_create(
    state: &AppState,
    input: EmployeeCreateInput,
) -> CommandResult<EmployeeRecord> {
    let service = state.employees();
    let employee = run_blocking(move || service.create_employee(input)).await?;
    Ok(ApiResponse::ok("员工创建成功", employee))
}

pub async fn employee_get(state: &AppState, id: String) -> CommandResult<EmployeeRecord> {
    let service = state.employees();
    let employee = run_blocking(move || service.get_employee(&id)).await?;
    Ok(ApiResponse::ok("查询成功", employee))
}

pub async fn employee_list(
    state: &AppState,
    department_id: Option<String>,
) -> CommandResult<Vec<EmployeeRecord>> {
    let service = state.employees();
    let employees =
        run_blocking(move || service.list_employees(department_id.as_deref())).await?;
    Ok(ApiResponse::ok("查询成功", employees))
}

pub async fn employee_update(
    state: &AppState,
    id: String,
    update: EmployeeUpdateInput,
) -> CommandResult<EmployeeRecord> {
    let service = state.employees();
    let employee = run_blocking(move || service.update_employee(&id, update)).await?;
    Ok(ApiResponse::ok("员工信息已更新", employee))
}

pub async fn employee_delete(state: &AppState, id: String) -> CommandResult<()> {
    let service = state.employees();
    run_blocking(move || service.delete_employee(&id)).await?;
    Ok(ApiResponse::ok("员工已删除", ()))
}

pub async fn department_create(
    state: &AppState,
    input: DepartmentInput,
) -> CommandResult<DepartmentRecord> {
    let service = state.employees();
    let department = run_blocking(move || service.create_department(input)).await?;
    Ok(ApiResponse::ok("部门创建成功", department))
}

pub async fn department_list(state: &AppState) -> CommandResult<Vec<DepartmentRecord>> {
    let service = state.employees();
    let departments = run_blocking(move || service.list_departments()).await?;
    Ok(ApiResponse::ok("查询成功", departments))
}

pub async fn department_update(
    state: &AppState,
    id: String,
    input: DepartmentInput,
) -> CommandResult<DepartmentRecord> {
    let service = state.employees();
    let department = run_blocking(move || service.update_department(&id, input)).await?;
    Ok(ApiResponse::ok("部门信息已更新", department))
}

pub async fn department_delete(state: &AppState, id: String) -> CommandResult<()> {
    let service = state.employees();
    run_blocking(move || service.delete_department(&id)).await?;
    Ok(ApiResponse::ok("部门已删除", ()))
}

pub async fn role_create(state: &AppState, input: RoleInput) -> CommandResult<RoleRecord> {
    let service = state.employees();
    let role = run_blocking(move || service.create_role(input)).await?;
    Ok(ApiResponse::ok("角色创建成功", role))
}

pub async fn role_list(state: &AppState) -> CommandResult<Vec<RoleRecord>> {
    let service = state.employees();
    let roles = run_blocking(move || service.list_roles()).await?;
    Ok(ApiResponse::ok("查询成功", roles))
}

pub async fn role_update(
    state: &AppState,
    id: String,
    input: RoleInput,
) -> CommandResult<RoleRecord> {
    let service = state.employees();
    let role = run_blocking(move || service.update_role(&id, input)).await?;
    Ok(ApiResponse::ok("角色信息已更新", role))
}

pub async fn role_delete(state: &AppState, id: String) -> CommandResult<()> {
    let service = state.employees();
    run_blocking(move || service.delete_role(&id)).await?;
    Ok(ApiResponse::ok("角色已删除", ()))
}

pub async fn project_create(
    state: &AppState,
    input: ProjectCreateInput,
) -> CommandResult<ProjectRecord> {
    let service = state.projects();
    let project = run_blocking(move || service.create_project(input)).await?;
    Ok(ApiResponse::ok("项目创建成功", project))
}

pub async fn project_get(state: &AppState, id: String) -> CommandResult<ProjectRecord> {
    let service = state.projects();
    let project = run_blocking(move || service.get_project(&id)).await?;
    Ok(ApiResponse::ok("查询成功", project))
}

pub async fn project_list(state: &AppState) -> CommandResult<Vec<ProjectRecord>> {
    let service = state.projects();
    let projects = run_blocking(move || service.list_projects()).await?;
    Ok(ApiResponse::ok("查询成功", projects))
}

pub async fn project_update(
    state: &AppState,
    id: String,
    update: ProjectUpdateInput,
) -> CommandResult<ProjectRecord> {
    let service = state.projects();
    let project = run_blocking(move || service.update_project(&id, update)).await?;
    Ok(ApiResponse::ok("项目信息已更新", project))
}

pub async fn project_member_add(
    state: &AppState,
    project_id: String,
    input: MemberCreateInput,
) -> CommandResult<ProjectMemberRecord> {
    let service = state.projects();
    let member = run_blocking(move || service.add_member(&project_id, input)).await?;
    Ok(ApiResponse::ok("项目成员已添加", member))
}

pub async fn project_member_list(
    state: &AppState,
    project_id: String,
) -> CommandResult<Vec<ProjectMemberRecord>> {
    let service = state.projects();
    let members = run_blocking(move || service.list_members(&project_id)).await?;
    Ok(ApiResponse::ok("查询成功", members))
}

pub async fn project_member_update(
    state: &AppState,
    member_id: String,
    update: MemberUpdateInput,
) -> CommandResult<ProjectMemberRecord> {
    let service = state.projects();
    let member = run_blocking(move || service.update_member(&member_id, update)).await?;
    Ok(ApiResponse::ok("项目成员已更新", member))
}

pub async fn project_member_remove(
    state: &AppState,
    member_id: String,
) -> CommandResult<ProjectMemberRecord> {
    let service = state.projects();
    let member = run_blocking(move || service.remove_member(&member_id)).await?;
    Ok(ApiResponse::ok("项目成员已移除", member))
}

pub async fn assessment_create(
    state: &AppState,
    input: AssessmentCreateInput,
) -> CommandResult<PerformanceAssessmentRecord> {
    let service = state.performance();
    let assessment = run_blocking(move || service.create_assessment(input)).await?;
    Ok(ApiResponse::ok("绩效记录已创建", assessment))
}

pub async fn assessment_list(
    state: &AppState,
    employee_id: String,
) -> CommandResult<Vec<PerformanceAssessmentRecord>> {
    let service = state.performance();
    let assessments = run_blocking(move || service.list_assessments(&employee_id)).await?;
    Ok(ApiResponse::ok("查询成功", assessments))
}

pub async fn assessment_update(
    state: &AppState,
    id: String,
    update: AssessmentUpdateInput,
) -> CommandResult<PerformanceAssessmentRecord> {
    let service = state.performance();
    let assessment = run_blocking(move || service.update_assessment(&id, update)).await?;
    Ok(ApiResponse::ok("绩效记录已更新", assessment))
}

pub async fn assessment_delete(state: &AppState, id: String) -> CommandResult<()> {
    let service = state.performance();
    run_blocking(move || service.delete_assessment(&id)).await?;
    Ok(ApiResponse::ok("绩效记录已删除", ()))
}

/// Coefficient the calculator would use for this employee and period.
pub async fn performance_coefficient(
    state: &AppState,
    employee_id: String,
    period: String,
) -> CommandResult<CoefficientResolution> {
    let service = state.performance();
    let resolution =
        run_blocking(move || Ok(service.resolve_coefficient(&employee_id, &period))).await?;
    Ok(ApiResponse::ok("查询成功", resolution))
}

pub async fn settings_get(state: &AppState) -> CommandResult<AllocationSettings> {
    let service = state.settings();
    let settings = run_blocking(move || service.allocation()).await?;
    Ok(ApiResponse::ok("查询成功", settings))
}

pub async fn settings_update(
    state: &AppState,
    input: AllocationSettingsUpdate,
) -> CommandResult<AllocationSettings> {
    let service = state.settings();
    let settings = run_blocking(move || service.update_allocation(input)).await?;
    Ok(ApiResponse::ok("分配设置已保存", settings))
}
