//! Procedural macros for statelane

use darling::{FromDeriveInput, FromMeta, FromVariant};
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, DeriveInput};

/// Container-level attributes for #[derive(Action)]
#[derive(Debug, FromDeriveInput)]
#[darling(attributes(action), supports(enum_any))]
struct ActionOpts {
    ident: syn::Ident,
    generics: syn::Generics,
    data: darling::ast::Data<ActionVariant, ()>,

    /// Case convention applied to variant names
    #[darling(default)]
    rename_all: Option<RenameRule>,

    /// Prepended to every action name, e.g. `"counter/"`
    #[darling(default)]
    prefix: Option<String>,
}

/// Variant-level attributes
#[derive(Debug, FromVariant)]
#[darling(attributes(action))]
struct ActionVariant {
    ident: syn::Ident,
    fields: darling::ast::Fields<()>,

    /// Explicit name override. Still gets the container prefix.
    #[darling(default)]
    rename: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum RenameRule {
    Snake,
    Kebab,
    ScreamingSnake,
}

impl FromMeta for RenameRule {
    fn from_string(value: &str) -> darling::Result<Self> {
        match value {
            "snake_case" => Ok(RenameRule::Snake),
            "kebab-case" => Ok(RenameRule::Kebab),
            "SCREAMING_SNAKE_CASE" => Ok(RenameRule::ScreamingSnake),
            other => Err(darling::Error::unknown_value(other)),
        }
    }
}

impl RenameRule {
    fn apply(self, name: &str) -> String {
        match self {
            RenameRule::Snake => to_snake_case(name),
            RenameRule::Kebab => to_snake_case(name).replace('_', "-"),
            RenameRule::ScreamingSnake => to_snake_case(name).to_uppercase(),
        }
    }
}

/// Convert PascalCase to snake_case
fn to_snake_case(s: &str) -> String {
    let mut result = String::new();
    for (i, ch) in s.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                result.push('_');
            }
            result.extend(ch.to_lowercase());
        } else {
            result.push(ch);
        }
    }
    result
}

/// Derive macro for the Action trait
///
/// Generates a `name()` method that returns the variant name, which is what
/// logging middleware filters on and what cycle profiles report.
///
/// Container attributes:
/// - `#[action(rename_all = "snake_case")]`: also `"kebab-case"` and
///   `"SCREAMING_SNAKE_CASE"`
/// - `#[action(prefix = "counter/")]`: prepended to every name
///
/// Variant attributes:
/// - `#[action(rename = "...")]`: explicit name for one variant
///
/// # Example
/// ```ignore
/// #[derive(Action, Clone, Debug)]
/// #[action(rename_all = "snake_case", prefix = "counter/")]
/// enum CounterAction {
///     Increment,
///     AddBy(i64),
///     #[action(rename = "reset!")]
///     Reset,
/// }
///
/// assert_eq!(CounterAction::AddBy(2).name(), "counter/add_by");
/// assert_eq!(CounterAction::Reset.name(), "counter/reset!");
/// ```
#[proc_macro_derive(Action, attributes(action))]
pub fn derive_action(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let opts = match ActionOpts::from_derive_input(&input) {
        Ok(opts) => opts,
        Err(e) => return e.write_errors().into(),
    };

    let name = &opts.ident;
    let (impl_generics, ty_generics, where_clause) = opts.generics.split_for_impl();

    let variants = match &opts.data {
        darling::ast::Data::Enum(variants) => variants,
        _ => {
            return syn::Error::new_spanned(&input, "Action can only be derived for enums")
                .to_compile_error()
                .into();
        }
    };

    let prefix = opts.prefix.as_deref().unwrap_or_default();
    let name_arms = variants
        .iter()
        .map(|v| name_arm(name, v, prefix, opts.rename_all));

    let expanded = quote! {
        impl #impl_generics statelane::Action for #name #ty_generics #where_clause {
            fn name(&self) -> &str {
                match self {
                    #(#name_arms),*
                }
            }
        }
    };

    TokenStream::from(expanded)
}

/// One `match` arm mapping a variant to its action name
fn name_arm(
    name: &syn::Ident,
    variant: &ActionVariant,
    prefix: &str,
    rename_all: Option<RenameRule>,
) -> TokenStream2 {
    let variant_name = &variant.ident;
    let base = match (&variant.rename, rename_all) {
        (Some(explicit), _) => explicit.clone(),
        (None, Some(rule)) => rule.apply(&variant_name.to_string()),
        (None, None) => variant_name.to_string(),
    };
    let variant_str = format!("{prefix}{base}");

    match &variant.fields.style {
        darling::ast::Style::Unit => quote! {
            #name::#variant_name => #variant_str
        },
        darling::ast::Style::Tuple => quote! {
            #name::#variant_name(..) => #variant_str
        },
        darling::ast::Style::Struct => quote! {
            #name::#variant_name { .. } => #variant_str
        },
    }
}
