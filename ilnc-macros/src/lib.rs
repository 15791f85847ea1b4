mod from_repr;
mod table;

/// Derives `<Name>Table::read`, a fixed-row-size reader for one ECMA-335
/// metadata table, from a struct whose fields are the row's columns.
#[proc_macro_derive(Table)]
pub fn derive_table(tokens: proc_macro::TokenStream) -> proc_macro::TokenStream {
	table::derive(tokens).into()
}

/// Derives `from_repr`, mapping a `#[repr(int)]` enum's explicit
/// discriminants back to variants, for opcode and table-kind enums.
#[proc_macro_derive(FromRepr)]
pub fn derive_from_repr(tokens: proc_macro::TokenStream) -> proc_macro::TokenStream {
	from_repr::derive(tokens).into()
}
