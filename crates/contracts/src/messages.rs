//! User-visible message catalog.
//!
//! Every human-readable string the API returns comes from here so a deployment
//! can switch language with one setting. Machine-readable codes never change.

use crate::EntityKind;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Locale {
    #[default]
    En,
    Vi,
}

impl Locale {
    pub fn parse(raw: &str) -> Option<Locale> {
        match raw.trim() {
            "en" | "en-us" | "EN" => Some(Locale::En),
            "vi" | "vi-vn" | "VI" => Some(Locale::Vi),
            _ => None,
        }
    }

    fn noun(self, kind: EntityKind) -> &'static str {
        match (self, kind) {
            (Locale::En, EntityKind::Faculty) => "faculty",
            (Locale::En, EntityKind::Major) => "major",
            (Locale::En, EntityKind::Class) => "class",
            (Locale::Vi, EntityKind::Faculty) => "khoa",
            (Locale::Vi, EntityKind::Major) => "ngành",
            (Locale::Vi, EntityKind::Class) => "lớp",
        }
    }

    fn plural(self, kind: EntityKind) -> &'static str {
        match (self, kind) {
            (Locale::En, EntityKind::Faculty) => "faculties",
            (Locale::En, EntityKind::Major) => "majors",
            (Locale::En, EntityKind::Class) => "classes",
            (Locale::Vi, kind) => self.noun(kind),
        }
    }

    pub fn invalid_data(self) -> &'static str {
        match self {
            Locale::En => "Invalid data.",
            Locale::Vi => "Dữ liệu không hợp lệ",
        }
    }

    pub fn field_required(self) -> &'static str {
        match self {
            Locale::En => "This field is required.",
            Locale::Vi => "Trường này là bắt buộc.",
        }
    }

    pub fn field_blank(self) -> &'static str {
        match self {
            Locale::En => "This field may not be blank.",
            Locale::Vi => "Trường này không được để trống.",
        }
    }

    pub fn field_null(self) -> &'static str {
        match self {
            Locale::En => "This field may not be null.",
            Locale::Vi => "Trường này không được để null.",
        }
    }

    pub fn min_length(self, min: usize) -> String {
        match self {
            Locale::En => format!("Ensure this field has at least {} characters.", min),
            Locale::Vi => format!("Đảm bảo trường này có ít nhất {} ký tự.", min),
        }
    }

    pub fn max_length(self, max: usize) -> String {
        match self {
            Locale::En => format!("Ensure this field has no more than {} characters.", max),
            Locale::Vi => format!("Đảm bảo trường này có không quá {} ký tự.", max),
        }
    }

    pub fn min_value(self, min: i64) -> String {
        match self {
            Locale::En => format!("Ensure this value is greater than or equal to {}.", min),
            Locale::Vi => format!("Đảm bảo giá trị này lớn hơn hoặc bằng {}.", min),
        }
    }

    pub fn max_value(self, max: i64) -> String {
        match self {
            Locale::En => format!("Ensure this value is less than or equal to {}.", max),
            Locale::Vi => format!("Đảm bảo giá trị này nhỏ hơn hoặc bằng {}.", max),
        }
    }

    pub fn invalid_integer(self) -> &'static str {
        match self {
            Locale::En => "A valid integer is required.",
            Locale::Vi => "Yêu cầu một số nguyên hợp lệ.",
        }
    }

    pub fn invalid_boolean(self) -> &'static str {
        match self {
            Locale::En => "Must be a valid boolean.",
            Locale::Vi => "Phải là giá trị boolean hợp lệ.",
        }
    }

    pub fn invalid_string(self) -> &'static str {
        match self {
            Locale::En => "Not a valid string.",
            Locale::Vi => "Không phải chuỗi hợp lệ.",
        }
    }

    pub fn malformed_body(self, reason: &str) -> String {
        match self {
            Locale::En => format!("Malformed request body: {}", reason),
            Locale::Vi => format!("Nội dung yêu cầu không hợp lệ: {}", reason),
        }
    }

    pub fn duplicate_code(self, kind: EntityKind, code: &str) -> String {
        match self {
            Locale::En => format!(
                "{} code '{}' already exists. Please choose another code.",
                capitalize(self.noun(kind)),
                code
            ),
            Locale::Vi => format!(
                "Mã {} '{}' đã tồn tại. Vui lòng chọn mã khác.",
                self.noun(kind),
                code
            ),
        }
    }

    pub fn parent_not_found(self, kind: EntityKind, id: i64) -> String {
        match self {
            Locale::En => format!("{} with ID {} was not found.", capitalize(self.noun(kind)), id),
            Locale::Vi => format!("Không tìm thấy {} với ID {}.", self.noun(kind), id),
        }
    }

    pub fn parent_inactive(self, kind: EntityKind) -> String {
        match (self, kind) {
            (Locale::En, EntityKind::Major) => {
                "This major is no longer enrolling. Please choose another major.".to_string()
            }
            (Locale::Vi, EntityKind::Major) => {
                "Ngành đã ngừng tuyển sinh. Vui lòng chọn ngành khác.".to_string()
            }
            (Locale::En, kind) => format!(
                "This {} is no longer active. Please choose another {}.",
                self.noun(kind),
                self.noun(kind)
            ),
            (Locale::Vi, kind) => format!(
                "{} đã ngừng hoạt động. Vui lòng chọn {} khác.",
                capitalize(self.noun(kind)),
                self.noun(kind)
            ),
        }
    }

    pub fn integrity_conflict(
        self,
        parent: EntityKind,
        parent_name: &str,
        dependent: EntityKind,
        count: u64,
    ) -> String {
        match self {
            Locale::En => format!(
                "Cannot delete {} '{}' because it still has {} related {}. Delete the {} first or set is_active=false.",
                self.noun(parent),
                parent_name,
                count,
                self.plural(dependent),
                self.plural(dependent)
            ),
            Locale::Vi => format!(
                "Không thể xóa {} '{}' vì còn {} {} liên quan. Vui lòng xóa các {} trước hoặc đặt is_active=false.",
                self.noun(parent),
                parent_name,
                count,
                self.noun(dependent),
                self.noun(dependent)
            ),
        }
    }

    pub fn not_authenticated(self) -> &'static str {
        match self {
            Locale::En => "You must be logged in to perform this action.",
            Locale::Vi => "Bạn cần đăng nhập để thực hiện thao tác này",
        }
    }

    pub fn authentication_failed(self) -> &'static str {
        match self {
            Locale::En => "Authentication failed. The token is invalid or has expired.",
            Locale::Vi => "Xác thực thất bại. Token không hợp lệ hoặc đã hết hạn",
        }
    }

    pub fn permission_denied(self) -> &'static str {
        match self {
            Locale::En => "You do not have permission to perform this action. Only admins are allowed.",
            Locale::Vi => "Bạn không có quyền thực hiện thao tác này. Chỉ Admin mới có quyền.",
        }
    }

    pub fn not_found(self) -> &'static str {
        match self {
            Locale::En => "The requested resource was not found.",
            Locale::Vi => "Không tìm thấy tài nguyên yêu cầu",
        }
    }

    pub fn method_not_allowed(self) -> &'static str {
        match self {
            Locale::En => "Method not allowed.",
            Locale::Vi => "Phương thức không được phép.",
        }
    }

    pub fn unknown_error(self) -> &'static str {
        match self {
            Locale::En => "An unexpected error occurred.",
            Locale::Vi => "Đã xảy ra lỗi không mong muốn.",
        }
    }

    pub fn invalid_credentials(self) -> &'static str {
        match self {
            Locale::En => "Invalid username or password",
            Locale::Vi => "Tên đăng nhập hoặc mật khẩu không đúng",
        }
    }

    pub fn account_disabled(self) -> &'static str {
        match self {
            Locale::En => "User account is disabled",
            Locale::Vi => "Tài khoản đã bị vô hiệu hóa",
        }
    }

    pub fn invalid_token(self) -> &'static str {
        match self {
            Locale::En => "Token is invalid or expired",
            Locale::Vi => "Token không hợp lệ hoặc đã hết hạn",
        }
    }

    pub fn passwords_mismatch(self) -> &'static str {
        match self {
            Locale::En => "Passwords do not match.",
            Locale::Vi => "Mật khẩu xác nhận không khớp.",
        }
    }

    pub fn new_passwords_mismatch(self) -> &'static str {
        match self {
            Locale::En => "New passwords do not match.",
            Locale::Vi => "Mật khẩu mới xác nhận không khớp.",
        }
    }

    pub fn wrong_current_password(self) -> &'static str {
        match self {
            Locale::En => "Current password is incorrect",
            Locale::Vi => "Mật khẩu hiện tại không đúng",
        }
    }

    pub fn password_changed(self) -> &'static str {
        match self {
            Locale::En => "Password changed successfully",
            Locale::Vi => "Đổi mật khẩu thành công",
        }
    }

    pub fn logged_out(self) -> &'static str {
        match self {
            Locale::En => "Logged out successfully",
            Locale::Vi => "Đăng xuất thành công",
        }
    }

    pub fn user_created(self) -> &'static str {
        match self {
            Locale::En => "User created successfully",
            Locale::Vi => "Tạo người dùng thành công",
        }
    }

    pub fn username_taken(self) -> &'static str {
        match self {
            Locale::En => "A user with that username already exists.",
            Locale::Vi => "Tên đăng nhập này đã được sử dụng.",
        }
    }

    pub fn invalid_username(self) -> &'static str {
        match self {
            Locale::En => {
                "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters."
            }
            Locale::Vi => {
                "Tên đăng nhập không hợp lệ. Chỉ được chứa chữ cái, chữ số và các ký tự @/./+/-/_."
            }
        }
    }

    pub fn invalid_email(self) -> &'static str {
        match self {
            Locale::En => "Enter a valid email address.",
            Locale::Vi => "Nhập địa chỉ email hợp lệ.",
        }
    }

    pub fn invalid_role(self) -> &'static str {
        match self {
            Locale::En => "Role must be one of ADMIN, TEACHER, STUDENT.",
            Locale::Vi => "Vai trò phải là ADMIN, TEACHER hoặc STUDENT.",
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integrity_message_names_parent_and_count() {
        let msg = Locale::En.integrity_conflict(
            EntityKind::Faculty,
            "Information Technology",
            EntityKind::Major,
            3,
        );
        assert!(msg.contains("'Information Technology'"));
        assert!(msg.contains(" 3 related majors"));
        assert!(msg.contains("is_active=false"));

        let vi = Locale::Vi.integrity_conflict(EntityKind::Major, "KTPM", EntityKind::Class, 2);
        assert!(vi.contains("còn 2 lớp liên quan"));
    }

    #[test]
    fn duplicate_code_message_is_capitalized_per_entity() {
        assert_eq!(
            Locale::En.duplicate_code(EntityKind::Class, "KTPM2021"),
            "Class code 'KTPM2021' already exists. Please choose another code."
        );
        assert!(Locale::Vi.duplicate_code(EntityKind::Faculty, "CNTT").starts_with("Mã khoa"));
    }

    #[test]
    fn inactive_parent_messages_differ_per_kind() {
        assert!(Locale::En.parent_inactive(EntityKind::Faculty).contains("faculty"));
        assert!(Locale::En.parent_inactive(EntityKind::Major).contains("enrolling"));
        assert_eq!(
            Locale::Vi.parent_inactive(EntityKind::Faculty),
            "Khoa đã ngừng hoạt động. Vui lòng chọn khoa khác."
        );
    }

    #[test]
    fn locale_parse_accepts_language_tags() {
        assert_eq!(Locale::parse("vi"), Some(Locale::Vi));
        assert_eq!(Locale::parse("en-us"), Some(Locale::En));
        assert_eq!(Locale::parse("fr"), None);
    }
}
